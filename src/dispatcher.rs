use crate::decoder::{DecoderFactory, DecoderMessage};
use crate::events::{EventHub, EventSubscription};
use crate::registry::ObserverToken;
use crate::session::SessionSnapshot;
use crate::surface::Surface;
use crate::{Config, Error, SessionId, SessionRegistry, Source};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

type Job = Box<dyn FnOnce(&mut SessionRegistry) + Send>;

enum Command {
    Run(Job),
    Detach(ObserverToken),
    Shutdown,
}

struct Worker {
    thread: ThreadId,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Starts the dispatcher thread that owns a fresh [`SessionRegistry`].
///
/// Caller commands, decoder callbacks and the progress timer are all
/// serialized onto that one thread.
pub fn spawn(factory: impl DecoderFactory + 'static, config: Config) -> Result<PlayerHandle, Error> {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let (decoder_tx, decoder_rx) = crossbeam_channel::unbounded();
    let events = EventHub::new(config.get_event_capacity());
    let thread_events = events.clone();
    let interval = config.get_progress_interval();

    let join = thread::Builder::new()
        .name(config.get_thread_name().to_string())
        .spawn(move || {
            let registry = SessionRegistry::new(factory, thread_events, decoder_tx);
            run_dispatch_loop(registry, cmd_rx, decoder_rx, interval);
        })?;

    Ok(PlayerHandle {
        commands: cmd_tx,
        events,
        worker: Arc::new(Worker {
            thread: join.thread().id(),
            join: Mutex::new(Some(join)),
        }),
    })
}

fn run_dispatch_loop(
    mut registry: SessionRegistry,
    commands: Receiver<Command>,
    decoder: Receiver<DecoderMessage>,
    interval: Duration,
) {
    log::info!("dispatcher started");
    let tick = crossbeam_channel::tick(interval);

    loop {
        crossbeam_channel::select! {
            recv(commands) -> msg => match msg {
                Ok(Command::Run(job)) => job(&mut registry),
                Ok(Command::Detach(token)) => {
                    registry.detach(&token);
                }
                Ok(Command::Shutdown) | Err(_) => break,
            },
            recv(decoder) -> msg => {
                if let Ok(message) = msg {
                    registry.dispatch(message);
                }
            }
            recv(tick) -> _ => registry.tick(),
        }
    }

    registry.invalidate_all();
    log::info!("dispatcher stopped");
}

/// Cloneable handle to a running dispatcher.
///
/// Every method blocks until the dispatcher replies, so none of them may be
/// called from inside a [`Surface`] callback.
#[derive(Clone)]
pub struct PlayerHandle {
    commands: Sender<Command>,
    events: EventHub,
    worker: Arc<Worker>,
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("thread", &self.worker.thread)
            .finish()
    }
}

/// Runs `f` on the dispatcher thread and waits for its result.
fn call<T, F>(commands: &Sender<Command>, f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce(&mut SessionRegistry) -> Result<T, Error> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    commands
        .send(Command::Run(Box::new(move |registry| {
            let _ = tx.send(f(registry));
        })))
        .map_err(|_| Error::Disconnected)?;
    rx.recv().map_err(|_| Error::Disconnected)?
}

impl PlayerHandle {
    fn call<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut SessionRegistry) -> Result<T, Error> + Send + 'static,
    {
        call(&self.commands, f)
    }

    pub fn create_session(&self, id: impl Into<SessionId>) -> Result<SessionId, Error> {
        let id = id.into();
        self.call(move |r| r.create(id))
    }

    pub fn set_source(&self, id: &SessionId, source: Source) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_source(&id, &source))
    }

    pub fn set_paused(&self, id: &SessionId, paused: bool) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_paused(&id, paused))
    }

    pub fn play(&self, id: &SessionId) -> Result<SessionId, Error> {
        self.set_paused(id, false)
    }

    pub fn pause(&self, id: &SessionId) -> Result<SessionId, Error> {
        self.set_paused(id, true)
    }

    pub fn set_repeat(&self, id: &SessionId, repeat: bool) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_repeat(&id, repeat))
    }

    pub fn set_muted(&self, id: &SessionId, muted: bool) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_muted(&id, muted))
    }

    pub fn set_volume(&self, id: &SessionId, volume: f32) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_volume(&id, volume))
    }

    pub fn set_rate(&self, id: &SessionId, rate: f32) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_rate(&id, rate))
    }

    pub fn set_seek(&self, id: &SessionId, seconds: f64) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.set_seek(&id, seconds))
    }

    pub fn remove_session(&self, id: &SessionId) -> Result<SessionId, Error> {
        let id = id.clone();
        self.call(move |r| r.remove(&id))
    }

    pub fn snapshot(&self, id: &SessionId) -> Result<SessionSnapshot, Error> {
        let id = id.clone();
        self.call(move |r| r.get(&id).map(|s| s.snapshot()))
    }

    pub fn session_ids(&self) -> Result<Vec<SessionId>, Error> {
        self.call(|r| Ok(r.ids().cloned().collect()))
    }

    /// Attaches `surface` to a session. Dropping the returned
    /// [`Attachment`] detaches it again.
    pub fn attach_surface(
        &self,
        id: &SessionId,
        surface: &Arc<dyn Surface>,
    ) -> Result<Attachment, Error> {
        let id = id.clone();
        let surface = Arc::downgrade(surface);
        let weak = surface.clone();
        let token = self.call(move |r| r.rebind(None, &id, weak))?;
        Ok(Attachment {
            token,
            surface,
            commands: self.commands.clone(),
        })
    }

    pub fn subscribe(&self, target: Option<SessionId>) -> EventSubscription {
        self.events.subscribe(target)
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Tears down every session and stops the dispatcher thread.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        if thread::current().id() == self.worker.thread {
            return;
        }
        if let Some(join) = self.worker.join.lock().take() {
            if join.join().is_err() {
                log::error!("dispatcher thread panicked");
            }
        }
    }
}

/// A surface registration. Detaches on drop.
pub struct Attachment {
    token: ObserverToken,
    surface: Weak<dyn Surface>,
    commands: Sender<Command>,
}

impl Attachment {
    pub fn session(&self) -> &SessionId {
        &self.token.session
    }

    /// Moves the surface to another session. The surface drops the old
    /// session's render target right away; on failure nothing changes.
    pub fn rebind(&mut self, id: &SessionId) -> Result<(), Error> {
        let previous = self.token.clone();
        let id = id.clone();
        let surface = self.surface.clone();
        self.token = call(&self.commands, move |r| {
            r.rebind(Some(&previous), &id, surface)
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Attachment").field(&self.token).finish()
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Detach(self.token.clone()));
    }
}
