use crate::decoder::{
    Decoder, DecoderEvent, DecoderMessage, LoadGeneration, MEDIA_ERROR_IO, MEDIA_ERROR_UNKNOWN,
};
use crate::events::{EventHub, EventKind};
use crate::surface::{ReadyInfo, Surface};
use crate::{Error, Source};
use rand::Rng;
use std::fmt;
use std::sync::Weak;

/// Opaque identifier of a player session.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A random guid-style id, for hosts that do not bring their own.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut group = |n: usize| -> String {
            (0..n)
                .map(|_| format!("{:04x}", rng.r#gen::<u16>()))
                .collect()
        };
        Self(format!(
            "{}-{}-{}-{}-{}",
            group(2),
            group(1),
            group(1),
            group(1),
            group(3)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Point-in-time copy of a session's playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub valid: bool,
    pub paused: bool,
    pub repeat: bool,
    pub muted: bool,
    pub volume: f32,
    pub effective_volume: f32,
    pub rate: f32,
    pub duration_ms: u64,
    pub buffered_ms: u64,
    pub completed: bool,
}

struct Observer {
    key: u64,
    surface: Weak<dyn Surface>,
}

/// One logical video player: a decoder handle plus the playback state
/// callers configure and observers are told about.
pub struct PlayerSession {
    id: SessionId,
    decoder: Option<Box<dyn Decoder>>,
    generation: LoadGeneration,
    events: EventHub,
    observers: Vec<Observer>,
    next_observer: u64,

    paused: bool,
    repeat: bool,
    muted: bool,
    volume: f32,
    rate: f32,
    duration_ms: u64,
    buffered_ms: u64,
    completed: bool,
    valid: bool,
}

impl fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("id", &self.id)
            .field("valid", &self.valid)
            .field("paused", &self.paused)
            .field("completed", &self.completed)
            .field("duration_ms", &self.duration_ms)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl PlayerSession {
    /// `generation` must be the one shared with the decoder's callbacks.
    pub fn new(
        id: SessionId,
        decoder: Box<dyn Decoder>,
        generation: LoadGeneration,
        events: EventHub,
    ) -> Self {
        Self {
            id,
            decoder: Some(decoder),
            generation,
            events,
            observers: Vec::new(),
            next_observer: 0,
            paused: true,
            repeat: false,
            muted: false,
            volume: 1.0,
            rate: 1.0,
            duration_ms: 0,
            buffered_ms: 0,
            completed: false,
            valid: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the decoder is prepared and safe to drive.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Volume actually applied to the decoder.
    pub fn effective_volume(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn buffered_ms(&self) -> u64 {
        self.buffered_ms
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_released(&self) -> bool {
        self.decoder.is_none()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            valid: self.valid,
            paused: self.paused,
            repeat: self.repeat,
            muted: self.muted,
            volume: self.volume,
            effective_volume: self.effective_volume(),
            rate: self.rate,
            duration_ms: self.duration_ms,
            buffered_ms: self.buffered_ms,
            completed: self.completed,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .iter()
            .filter(|o| o.surface.strong_count() > 0)
            .count()
    }

    /// Loads a new source, discarding the previous one.
    ///
    /// `load-start` is emitted once the source is opened; readiness arrives
    /// later as [`DecoderEvent::Prepared`]. A source that cannot be opened is
    /// reported both as an `error` event and as the returned error.
    pub fn load(&mut self, source: &Source) -> Result<(), Error> {
        let Some(decoder) = self.decoder.as_mut() else {
            log::warn!("load called on released player {}", self.id);
            return Err(Error::NotFound(self.id.clone()));
        };

        let generation = self.generation.advance();
        log::debug!("trying to open {} for {} (load {generation})", source.uri, self.id);
        self.valid = false;
        decoder.reset();
        self.duration_ms = 0;
        self.buffered_ms = 0;
        self.completed = false;

        if let Err(err) = decoder.open(source) {
            log::error!("error loading video {} for {}: {err}", source.uri, self.id);
            self.events.emit(
                &self.id,
                EventKind::Error {
                    code: MEDIA_ERROR_UNKNOWN,
                    extra_code: MEDIA_ERROR_IO,
                },
            );
            return Err(err);
        }

        self.events.emit(
            &self.id,
            EventKind::LoadStart {
                uri: source.uri.clone(),
                media_type: source.media_type.clone(),
                is_network: source.is_network,
            },
        );

        if let Err(err) = decoder.prepare_async() {
            log::error!("error preparing {} for {}: {err}", source.uri, self.id);
            self.events.emit(
                &self.id,
                EventKind::Error {
                    code: MEDIA_ERROR_UNKNOWN,
                    extra_code: MEDIA_ERROR_IO,
                },
            );
            return Err(err);
        }

        Ok(())
    }

    /// Play (`false`) or pause (`true`). No-op if already in that state.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;

        if !self.valid {
            log::warn!("set_paused({paused}) called with invalid player {}", self.id);
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        if paused {
            if decoder.is_playing() {
                log::debug!("pausing playback of {}", self.id);
                decoder.pause();
            }
        } else if !decoder.is_playing() {
            log::debug!("starting playback of {}", self.id);
            decoder.start();
            self.completed = false;
        }
    }

    pub fn play(&mut self) {
        self.set_paused(false)
    }

    pub fn pause(&mut self) {
        self.set_paused(true)
    }

    /// Seeks to `seconds`, clamped to the media duration.
    pub fn seek(&mut self, seconds: f64) {
        if !self.valid {
            log::warn!("seek to {seconds}s ignored, player {} is not ready", self.id);
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        let requested = (seconds.max(0.0) * 1000.0).round() as u64;
        let target = if self.duration_ms > 0 {
            requested.min(self.duration_ms)
        } else {
            requested
        };
        let previous = decoder.position_ms();

        self.events.emit(
            &self.id,
            EventKind::Seek {
                previous_time: secs(previous),
                current_time: secs(target),
                seek_time: secs(target),
            },
        );

        decoder.seek_to(target);
        if self.completed && self.duration_ms != 0 && target < self.duration_ms {
            self.completed = false;
        }
    }

    /// Only `1.0` (play) and `0.0` (pause) are supported.
    pub fn set_rate(&mut self, rate: f32) {
        log::debug!("setting rate {} -> {rate} ({})", self.rate, self.id);
        self.rate = rate;
        if !self.valid {
            return;
        }

        if rate == 1.0 {
            self.set_paused(false);
        } else if rate == 0.0 {
            self.set_paused(true);
        } else {
            log::warn!("playback rate {rate} is not supported, ignoring");
        }
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
        self.apply_modifiers();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.apply_modifiers();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.apply_modifiers();
    }

    fn apply_modifiers(&mut self) {
        let volume = self.effective_volume();
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.set_volume(volume);
        }
    }

    /// Applies a queued decoder callback unless it belongs to a superseded
    /// load. Returns whether it was applied.
    pub fn on_decoder_message(&mut self, message: DecoderMessage) -> bool {
        let current = self.generation.current();
        if message.generation != current {
            log::debug!(
                "dropped {:?} from load {} of {}, now at load {current}",
                message.event,
                message.generation,
                self.id
            );
            return false;
        }
        self.on_decoder_event(message.event);
        true
    }

    /// Applies a decoder callback for the current load. Must run on the
    /// dispatcher thread.
    pub fn on_decoder_event(&mut self, event: DecoderEvent) {
        match event {
            DecoderEvent::Prepared => self.on_prepared(),
            DecoderEvent::Error { what, extra } => {
                log::error!(
                    "error playing media. code: {what} {extra} player id: {}",
                    self.id
                );
                self.valid = false;
                self.events.emit(
                    &self.id,
                    EventKind::Error {
                        code: what,
                        extra_code: extra,
                    },
                );
            }
            DecoderEvent::Completion => {
                let Some(decoder) = self.decoder.as_mut() else {
                    return;
                };
                if self.repeat {
                    decoder.seek_to(0);
                    decoder.start();
                } else {
                    self.completed = true;
                }
                self.events.emit(&self.id, EventKind::End);
            }
            DecoderEvent::Buffering { percent } => {
                self.buffered_ms =
                    (self.duration_ms as f64 * f64::from(percent) / 100.0).round() as u64;
            }
        }
    }

    fn on_prepared(&mut self) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        log::debug!("media prepared for playing {}", self.id);

        self.valid = true;
        self.duration_ms = decoder.duration_ms();
        let (width, height) = decoder.video_size();
        self.events.emit(
            &self.id,
            EventKind::Load {
                duration: secs(self.duration_ms),
                current_time: secs(decoder.position_ms()),
                width,
                height,
                capabilities: decoder.capabilities(),
            },
        );
        self.apply_modifiers();

        let info = self.ready_info();
        self.notify(|surface| surface.on_ready(&info));

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.show_preview();
        }
        let paused = self.paused;
        self.set_paused(paused);
    }

    /// Emits a progress event while valid and not completed.
    pub fn tick(&mut self) {
        if !self.valid || self.completed {
            return;
        }
        let Some(decoder) = self.decoder.as_ref() else {
            return;
        };
        self.events.emit(
            &self.id,
            EventKind::Progress {
                current_time: secs(decoder.position_ms()),
                playable_duration: secs(self.buffered_ms),
            },
        );
    }

    fn ready_info(&self) -> ReadyInfo {
        let decoder = self.decoder.as_ref();
        let (width, height) = decoder.map(|d| d.video_size()).unwrap_or_default();
        ReadyInfo {
            session: self.id.clone(),
            width,
            height,
            target: decoder.and_then(|d| d.render_target()),
        }
    }

    /// Registers a surface; it hears `ready` at once if the session is valid.
    pub fn attach(&mut self, surface: Weak<dyn Surface>) -> u64 {
        let key = self.next_observer;
        self.next_observer += 1;

        if self.valid {
            if let Some(strong) = surface.upgrade() {
                strong.on_ready(&self.ready_info());
            }
        }
        self.observers.push(Observer { key, surface });
        key
    }

    /// Unregisters a surface and lets it drop this session's render target.
    /// Returns whether it was attached.
    pub fn detach(&mut self, key: u64) -> bool {
        let Some(index) = self.observers.iter().position(|o| o.key == key) else {
            return false;
        };
        let observer = self.observers.remove(index);
        if let Some(surface) = observer.surface.upgrade() {
            surface.on_destroyed();
        }
        true
    }

    fn notify(&mut self, f: impl Fn(&dyn Surface)) {
        self.observers.retain(|observer| match observer.surface.upgrade() {
            Some(surface) => {
                f(surface.as_ref());
                true
            }
            None => false,
        });
    }

    /// Releases the decoder and tells every surface. Safe to call twice.
    pub fn teardown(&mut self) {
        self.valid = false;
        if let Some(mut decoder) = self.decoder.take() {
            log::debug!("invalidating player {}", self.id);
            decoder.release();
        }
        self.notify(|surface| surface.on_destroyed());
        self.observers.clear();
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSubscription;
    use crate::mock::{MockDecoder, MockState};
    use crate::surface::SurfaceSlot;
    use std::sync::Arc;

    fn session() -> (PlayerSession, MockState, EventSubscription) {
        let hub = EventHub::new(64);
        let events = hub.subscribe(None);
        let (decoder, state) = MockDecoder::new(12_000, (640, 360));
        (
            PlayerSession::new(
                SessionId::from("p1"),
                Box::new(decoder),
                LoadGeneration::default(),
                hub,
            ),
            state,
            events,
        )
    }

    fn ready_session() -> (PlayerSession, MockState, EventSubscription) {
        let (mut session, state, events) = session();
        session
            .load(&Source::from_uri("https://cdn.example.com/a.mp4", None))
            .unwrap();
        session.on_decoder_event(DecoderEvent::Prepared);
        events.drain();
        (session, state, events)
    }

    fn kinds(events: &EventSubscription) -> Vec<EventKind> {
        events.drain().into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn generated_ids_look_like_guids() {
        let id = SessionId::generate();
        let groups: Vec<_> = id.as_str().split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn messages_from_a_superseded_load_are_ignored() {
        let (mut session, _state, events) = session();
        let source = Source::from_uri("https://cdn.example.com/a.mp4", None);
        session.load(&source).unwrap();
        session.load(&source).unwrap();
        events.drain();

        let stale = DecoderMessage {
            session: SessionId::from("p1"),
            generation: 1,
            event: DecoderEvent::Prepared,
        };
        assert!(!session.on_decoder_message(stale.clone()));
        assert!(!session.is_valid());
        assert!(events.drain().is_empty());

        assert!(session.on_decoder_message(DecoderMessage { generation: 2, ..stale }));
        assert!(session.is_valid());
    }

    #[test]
    fn load_emits_load_start_then_prepares() {
        let (mut session, state, events) = session();
        session
            .load(&Source::from_uri("https://cdn.example.com/a.mp4", None))
            .unwrap();

        assert_eq!(
            kinds(&events),
            vec![EventKind::LoadStart {
                uri: "https://cdn.example.com/a.mp4".into(),
                media_type: "mp4".into(),
                is_network: true,
            }]
        );
        assert!(state.lock().preparing);
        assert!(!session.is_valid());
    }

    #[test]
    fn failed_open_emits_error_and_returns_it() {
        let (mut session, state, events) = session();
        state.lock().fail_open = true;

        let err = session
            .load(&Source::from_uri("https://cdn.example.com/a.mp4", None))
            .unwrap_err();
        assert!(matches!(err, Error::SourceLoad { .. }));
        assert_eq!(
            kinds(&events),
            vec![EventKind::Error {
                code: MEDIA_ERROR_UNKNOWN,
                extra_code: MEDIA_ERROR_IO
            }]
        );
        assert!(!state.lock().preparing);
    }

    #[test]
    fn prepared_emits_load_and_stays_paused() {
        let (mut session, state, events) = session();
        session
            .load(&Source::from_uri("/videos/a.mp4", None))
            .unwrap();
        events.drain();
        session.on_decoder_event(DecoderEvent::Prepared);

        assert!(session.is_valid());
        assert_eq!(session.duration_ms(), 12_000);
        match &kinds(&events)[..] {
            [EventKind::Load { duration, width, height, .. }] => {
                assert_eq!(*duration, 12.0);
                assert_eq!((*width, *height), (640, 360));
            }
            other => panic!("unexpected events {other:?}"),
        }
        let state = state.lock();
        assert!(!state.playing);
        assert_eq!(state.previews, 1);
    }

    #[test]
    fn play_is_idempotent() {
        let (mut session, state, _events) = ready_session();
        session.play();
        session.play();
        session.play();
        assert_eq!(state.lock().starts, 1);
        session.pause();
        session.pause();
        assert_eq!(state.lock().pauses, 1);
    }

    #[test]
    fn play_while_invalid_only_records_intent() {
        let (mut session, state, _events) = session();
        session.play();
        assert!(!session.is_paused());
        assert_eq!(state.lock().starts, 0);

        session
            .load(&Source::from_uri("/videos/a.mp4", None))
            .unwrap();
        session.on_decoder_event(DecoderEvent::Prepared);
        assert!(state.lock().playing);
    }

    #[test]
    fn seek_clamps_to_duration() {
        let (mut session, state, events) = ready_session();
        session.seek(22.0);

        assert_eq!(
            kinds(&events),
            vec![EventKind::Seek {
                previous_time: 0.0,
                current_time: 12.0,
                seek_time: 12.0
            }]
        );
        assert_eq!(state.lock().position_ms, 12_000);
    }

    #[test]
    fn negative_seek_goes_to_start() {
        let (mut session, state, _events) = ready_session();
        state.lock().position_ms = 5_000;
        session.seek(-3.0);
        assert_eq!(state.lock().position_ms, 0);
    }

    #[test]
    fn seek_before_end_clears_completion() {
        let (mut session, _state, events) = ready_session();
        session.on_decoder_event(DecoderEvent::Completion);
        assert!(session.is_completed());
        assert_eq!(kinds(&events), vec![EventKind::End]);

        session.seek(3.0);
        assert!(!session.is_completed());
    }

    #[test]
    fn seek_while_invalid_is_ignored() {
        let (mut session, state, events) = session();
        session.seek(3.0);
        assert!(events.drain().is_empty());
        assert_eq!(state.lock().position_ms, 0);
    }

    #[test]
    fn mute_forces_zero_and_unmute_restores() {
        let (mut session, state, _events) = ready_session();
        session.set_volume(0.37);
        assert_eq!(state.lock().volume, 0.37);

        session.set_muted(true);
        assert_eq!(state.lock().volume, 0.0);
        assert_eq!(session.volume(), 0.37);

        session.set_muted(false);
        assert_eq!(state.lock().volume, 0.37);
    }

    #[test]
    fn volume_is_clamped() {
        let (mut session, state, _events) = ready_session();
        session.set_volume(3.0);
        assert_eq!(state.lock().volume, 1.0);
        session.set_volume(-1.0);
        assert_eq!(state.lock().volume, 0.0);
    }

    #[test]
    fn rate_drives_transport() {
        let (mut session, state, _events) = ready_session();
        session.set_rate(1.0);
        assert!(state.lock().playing);
        session.set_rate(0.5);
        assert!(state.lock().playing);
        assert_eq!(session.rate(), 0.5);
        session.set_rate(0.0);
        assert!(!state.lock().playing);
    }

    #[test]
    fn completion_with_repeat_restarts() {
        let (mut session, state, events) = ready_session();
        session.set_repeat(true);
        session.play();
        state.lock().position_ms = 12_000;

        session.on_decoder_event(DecoderEvent::Completion);
        assert!(!session.is_completed());
        assert_eq!(state.lock().position_ms, 0);
        assert!(state.lock().playing);
        assert_eq!(kinds(&events), vec![EventKind::End]);
    }

    #[test]
    fn decoder_error_invalidates() {
        let (mut session, _state, events) = ready_session();
        session.on_decoder_event(DecoderEvent::Error { what: 100, extra: -38 });
        assert!(!session.is_valid());
        assert_eq!(
            kinds(&events),
            vec![EventKind::Error { code: 100, extra_code: -38 }]
        );

        session.tick();
        assert!(events.drain().is_empty());
    }

    #[test]
    fn buffering_scales_duration() {
        let (mut session, _state, _events) = ready_session();
        session.on_decoder_event(DecoderEvent::Buffering { percent: 25 });
        assert_eq!(session.buffered_ms(), 3_000);
    }

    #[test]
    fn tick_reports_progress_while_paused() {
        let (mut session, state, events) = ready_session();
        state.lock().position_ms = 1_500;
        session.on_decoder_event(DecoderEvent::Buffering { percent: 50 });
        session.tick();

        assert!(session.is_paused());
        assert_eq!(
            kinds(&events),
            vec![EventKind::Progress {
                current_time: 1.5,
                playable_duration: 6.0
            }]
        );
    }

    #[test]
    fn tick_is_silent_once_completed() {
        let (mut session, _state, events) = ready_session();
        session.on_decoder_event(DecoderEvent::Completion);
        events.drain();
        session.tick();
        assert!(events.drain().is_empty());
    }

    #[test]
    fn surfaces_hear_ready_and_destroyed() {
        let (mut session, state, _events) = session();
        let slot = Arc::new(SurfaceSlot::default());
        let weak: Weak<dyn Surface> = Arc::downgrade(&(slot.clone() as Arc<dyn Surface>));
        session.attach(weak);

        session
            .load(&Source::from_uri("/videos/a.mp4", None))
            .unwrap();
        session.on_decoder_event(DecoderEvent::Prepared);
        assert!(slot.is_ready());
        assert_eq!(slot.video_size(), (640, 360));

        session.teardown();
        assert!(!slot.is_ready());
        assert!(state.lock().released);
        assert_eq!(session.observer_count(), 0);

        session.teardown();
        session.tick();
    }

    #[test]
    fn late_attach_to_ready_session_is_ready_immediately() {
        let (mut session, _state, _events) = ready_session();
        let slot = Arc::new(SurfaceSlot::default());
        let weak: Weak<dyn Surface> = Arc::downgrade(&(slot.clone() as Arc<dyn Surface>));
        let key = session.attach(weak);
        assert!(slot.is_ready());
        assert!(session.detach(key));
        assert!(!slot.is_ready());
        assert!(slot.target().is_none());
        assert!(!session.detach(key));
    }

    #[test]
    fn dropped_surfaces_are_pruned() {
        let (mut session, _state, _events) = session();
        let slot = Arc::new(SurfaceSlot::default());
        let weak: Weak<dyn Surface> = Arc::downgrade(&(slot.clone() as Arc<dyn Surface>));
        session.attach(weak);
        drop(slot);

        session
            .load(&Source::from_uri("/videos/a.mp4", None))
            .unwrap();
        session.on_decoder_event(DecoderEvent::Prepared);
        assert_eq!(session.observer_count(), 0);
    }
}
