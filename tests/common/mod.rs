#![allow(dead_code)]

use avplayer_bridge::{Decoder, DecoderCallbacks, Error, EventKind, EventSubscription, Source};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

/// Decoder state visible to the test after the factory moved into the dispatcher.
#[derive(Debug, Default)]
pub struct FakeState {
    pub position_ms: u64,
    pub playing: bool,
    pub volume: f32,
    pub released: bool,
    pub seeks: Vec<u64>,
}

pub struct FakeDecoder {
    callbacks: DecoderCallbacks,
    state: Arc<Mutex<FakeState>>,
    duration_ms: u64,
}

impl Decoder for FakeDecoder {
    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.position_ms = 0;
        state.playing = false;
    }

    fn open(&mut self, source: &Source) -> Result<(), Error> {
        if source.uri.contains("missing") {
            return Err(Error::SourceLoad {
                uri: source.uri.clone(),
                reason: "no such file".into(),
            });
        }
        source.url().map(|_| ())
    }

    fn prepare_async(&mut self) -> Result<(), Error> {
        self.callbacks.prepared();
        Ok(())
    }

    fn start(&mut self) {
        self.state.lock().playing = true;
    }

    fn pause(&mut self) {
        self.state.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn seek_to(&mut self, position_ms: u64) {
        let mut state = self.state.lock();
        state.position_ms = position_ms;
        state.seeks.push(position_ms);
    }

    fn position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn video_size(&self) -> (u32, u32) {
        (1920, 1080)
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn release(&mut self) {
        self.state.lock().released = true;
    }
}

/// A factory closure handing out [`FakeDecoder`]s of `duration_ms`, plus the
/// list of their states in creation order.
pub fn fake_factory(
    duration_ms: u64,
) -> (
    impl FnMut(DecoderCallbacks) -> Result<Box<dyn Decoder>, Error> + Send + 'static,
    Arc<Mutex<Vec<Arc<Mutex<FakeState>>>>>,
) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let created = states.clone();
    let factory = move |callbacks: DecoderCallbacks| -> Result<Box<dyn Decoder>, Error> {
        let state = Arc::new(Mutex::new(FakeState::default()));
        created.lock().push(state.clone());
        Ok(Box::new(FakeDecoder {
            callbacks,
            state,
            duration_ms,
        }))
    };
    (factory, states)
}

pub fn wait_for(events: &EventSubscription, pred: impl Fn(&EventKind) -> bool) -> EventKind {
    loop {
        let event = events.recv_timeout(WAIT).expect("timed out waiting for event");
        if pred(&event.kind) {
            return event.kind;
        }
    }
}
