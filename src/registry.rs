use crate::decoder::{DecoderCallbacks, DecoderFactory, DecoderMessage};
use crate::events::EventHub;
use crate::surface::Surface;
use crate::{Error, PlayerSession, SessionId, Source};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::Weak;

/// Identifies one surface registration on one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverToken {
    pub session: SessionId,
    key: u64,
}

/// Table of live player sessions keyed by id.
///
/// Not synchronized: every call is expected on the same logical thread,
/// normally the dispatcher's.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, PlayerSession>,
    factory: Box<dyn DecoderFactory>,
    events: EventHub,
    callbacks: Sender<DecoderMessage>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SessionRegistry {
    /// `callbacks` is where decoders post their asynchronous notifications;
    /// whoever drains it feeds them back through [`SessionRegistry::dispatch`].
    pub fn new(
        factory: impl DecoderFactory + 'static,
        events: EventHub,
        callbacks: Sender<DecoderMessage>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            factory: Box::new(factory),
            events,
            callbacks,
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn create(&mut self, id: SessionId) -> Result<SessionId, Error> {
        if self.sessions.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }

        let callbacks = DecoderCallbacks::new(id.clone(), self.callbacks.clone());
        let generation = callbacks.generation().clone();
        let decoder = self.factory.create(callbacks)?;
        let session = PlayerSession::new(id.clone(), decoder, generation, self.events.clone());
        log::debug!("created player {id}");
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    pub fn get(&self, id: &SessionId) -> Result<&PlayerSession, Error> {
        self.sessions.get(id).ok_or_else(|| not_found(id))
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Result<&mut PlayerSession, Error> {
        self.sessions.get_mut(id).ok_or_else(|| not_found(id))
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SessionId> {
        self.sessions.keys()
    }

    fn with_session(
        &mut self,
        id: &SessionId,
        f: impl FnOnce(&mut PlayerSession),
    ) -> Result<SessionId, Error> {
        f(self.get_mut(id)?);
        Ok(id.clone())
    }

    /// Tears the session down, surfaces included, then evicts it.
    pub fn remove(&mut self, id: &SessionId) -> Result<SessionId, Error> {
        self.get_mut(id)?.teardown();
        self.sessions.remove(id);
        log::debug!("removed player {id}");
        Ok(id.clone())
    }

    /// Tears down every session.
    pub fn invalidate_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.teardown();
        }
    }

    pub fn set_source(&mut self, id: &SessionId, source: &Source) -> Result<SessionId, Error> {
        self.get_mut(id)?.load(source)?;
        Ok(id.clone())
    }

    pub fn set_paused(&mut self, id: &SessionId, paused: bool) -> Result<SessionId, Error> {
        self.with_session(id, |s| s.set_paused(paused))
    }

    pub fn set_repeat(&mut self, id: &SessionId, repeat: bool) -> Result<SessionId, Error> {
        self.with_session(id, |s| s.set_repeat(repeat))
    }

    pub fn set_muted(&mut self, id: &SessionId, muted: bool) -> Result<SessionId, Error> {
        self.with_session(id, |s| s.set_muted(muted))
    }

    pub fn set_volume(&mut self, id: &SessionId, volume: f32) -> Result<SessionId, Error> {
        self.with_session(id, |s| s.set_volume(volume))
    }

    pub fn set_rate(&mut self, id: &SessionId, rate: f32) -> Result<SessionId, Error> {
        self.with_session(id, |s| s.set_rate(rate))
    }

    pub fn set_seek(&mut self, id: &SessionId, seconds: f64) -> Result<SessionId, Error> {
        self.with_session(id, |s| s.seek(seconds))
    }

    pub fn attach(
        &mut self,
        id: &SessionId,
        surface: Weak<dyn Surface>,
    ) -> Result<ObserverToken, Error> {
        let key = self.get_mut(id)?.attach(surface);
        Ok(ObserverToken {
            session: id.clone(),
            key,
        })
    }

    /// Moves a surface registration to `id`.
    ///
    /// The previous registration, if any, is dropped first so the surface lets
    /// go of the old render target before it hears about the new session. If
    /// `id` is unknown nothing changes.
    pub fn rebind(
        &mut self,
        previous: Option<&ObserverToken>,
        id: &SessionId,
        surface: Weak<dyn Surface>,
    ) -> Result<ObserverToken, Error> {
        if !self.contains(id) {
            return Err(not_found(id));
        }
        if let Some(previous) = previous {
            self.detach(previous);
        }
        self.attach(id, surface)
    }

    /// Returns whether the registration still existed.
    pub fn detach(&mut self, token: &ObserverToken) -> bool {
        self.sessions
            .get_mut(&token.session)
            .is_some_and(|s| s.detach(token.key))
    }

    /// Applies a decoder callback to its session.
    pub fn dispatch(&mut self, message: DecoderMessage) {
        match self.sessions.get_mut(&message.session) {
            Some(session) => {
                session.on_decoder_message(message);
            }
            None => log::debug!(
                "dropped {:?} for removed player {}",
                message.event,
                message.session
            ),
        }
    }

    /// One progress pass over every session.
    pub fn tick(&mut self) {
        for session in self.sessions.values_mut() {
            session.tick();
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.invalidate_all();
    }
}

fn not_found(id: &SessionId) -> Error {
    log::error!("failed getting player with id {id}");
    Error::NotFound(id.clone())
}
