//! Scripted in-memory decoder for unit tests.

use crate::decoder::{Decoder, DecoderCallbacks, DecoderFactory};
use crate::{Error, SessionId, Source};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct MockInner {
    pub duration_ms: u64,
    pub size: (u32, u32),
    pub position_ms: u64,
    pub volume: f32,
    pub playing: bool,
    pub preparing: bool,
    pub released: bool,
    pub fail_open: bool,
    pub auto_prepare: bool,
    pub starts: usize,
    pub pauses: usize,
    pub previews: usize,
    pub source: Option<Source>,
    pub callbacks: Option<DecoderCallbacks>,
}

pub(crate) type MockState = Arc<Mutex<MockInner>>;

pub(crate) struct MockDecoder {
    state: MockState,
}

impl MockDecoder {
    pub fn new(duration_ms: u64, size: (u32, u32)) -> (Self, MockState) {
        let state = Arc::new(Mutex::new(MockInner {
            duration_ms,
            size,
            volume: 1.0,
            ..Default::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl Decoder for MockDecoder {
    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.preparing = false;
        state.position_ms = 0;
        state.source = None;
    }

    fn open(&mut self, source: &Source) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(Error::SourceLoad {
                uri: source.uri.clone(),
                reason: "scripted failure".into(),
            });
        }
        source.url()?;
        state.source = Some(source.clone());
        Ok(())
    }

    fn prepare_async(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.preparing = true;
        if state.auto_prepare {
            if let Some(callbacks) = &state.callbacks {
                callbacks.prepared();
            }
        }
        Ok(())
    }

    fn start(&mut self) {
        let mut state = self.state.lock();
        state.playing = true;
        state.starts += 1;
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.pauses += 1;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }

    fn position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&self) -> u64 {
        self.state.lock().duration_ms
    }

    fn video_size(&self) -> (u32, u32) {
        self.state.lock().size
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn show_preview(&mut self) {
        self.state.lock().previews += 1;
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.released = true;
        state.playing = false;
    }
}

/// Hands out mock decoders and keeps their state by session id.
#[derive(Clone, Default)]
pub(crate) struct MockFactory {
    pub decoders: Arc<Mutex<HashMap<SessionId, MockState>>>,
    pub auto_prepare: bool,
}

impl MockFactory {
    pub fn auto_prepare() -> Self {
        Self {
            auto_prepare: true,
            ..Default::default()
        }
    }

    pub fn state(&self, id: &str) -> MockState {
        self.decoders.lock()[&SessionId::from(id)].clone()
    }
}

impl DecoderFactory for MockFactory {
    fn create(&mut self, callbacks: DecoderCallbacks) -> Result<Box<dyn Decoder>, Error> {
        let (decoder, state) = MockDecoder::new(30_000, (1280, 720));
        {
            let mut inner = state.lock();
            inner.auto_prepare = self.auto_prepare;
            inner.callbacks = Some(callbacks.clone());
        }
        self.decoders
            .lock()
            .insert(callbacks.session().clone(), state);
        Ok(Box::new(decoder))
    }
}
