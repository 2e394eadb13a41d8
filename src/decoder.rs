use crate::events::Capabilities;
use crate::{Error, SessionId, Source};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Android-style error code for failures whose cause is not known.
pub const MEDIA_ERROR_UNKNOWN: i32 = 1;
/// Android-style extra code for I/O failures while opening a source.
pub const MEDIA_ERROR_IO: i32 = -1004;

/// Asynchronous notifications from the platform media stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderEvent {
    /// The source finished preparing and can be played.
    Prepared,
    /// Playback failed with a platform code pair.
    Error { what: i32, extra: i32 },
    /// Playback reached the end of the media.
    Completion,
    /// Percentage of the media buffered so far.
    Buffering { percent: u8 },
}

/// A decoder callback tagged with the session and load it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderMessage {
    pub session: SessionId,
    pub generation: u64,
    pub event: DecoderEvent,
}

/// Counts the loads of one session.
///
/// Shared between a session and its decoder's callbacks so messages queued by
/// a superseded load can be told apart from current ones.
#[derive(Debug, Clone, Default)]
pub struct LoadGeneration(Arc<AtomicU64>);

impl LoadGeneration {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Starts a new load and returns its generation.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Handle a decoder uses to report its callbacks.
///
/// Callbacks may fire on any thread; they are only queued here and applied to
/// the session on the dispatcher thread. Unless [pinned](Self::pinned), a
/// callback is stamped with the load current at the time it is posted.
#[derive(Debug, Clone)]
pub struct DecoderCallbacks {
    session: SessionId,
    generation: LoadGeneration,
    pinned: Option<u64>,
    tx: Sender<DecoderMessage>,
}

impl DecoderCallbacks {
    pub fn new(session: SessionId, tx: Sender<DecoderMessage>) -> Self {
        Self {
            session,
            generation: LoadGeneration::default(),
            pinned: None,
            tx,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn generation(&self) -> &LoadGeneration {
        &self.generation
    }

    /// A copy stamped with the current load for good.
    ///
    /// Threads serving one opened source post through a pinned copy, so
    /// anything they report after the next load is discarded.
    pub fn pinned(&self) -> Self {
        Self {
            pinned: Some(self.generation.current()),
            ..self.clone()
        }
    }

    pub fn post(&self, event: DecoderEvent) {
        let message = DecoderMessage {
            session: self.session.clone(),
            generation: self.pinned.unwrap_or_else(|| self.generation.current()),
            event,
        };
        if self.tx.send(message).is_err() {
            log::debug!("dispatcher gone, dropped {event:?} for {}", self.session);
        }
    }

    pub fn prepared(&self) {
        self.post(DecoderEvent::Prepared)
    }

    pub fn error(&self, what: i32, extra: i32) {
        self.post(DecoderEvent::Error { what, extra })
    }

    pub fn completion(&self) {
        self.post(DecoderEvent::Completion)
    }

    pub fn buffering(&self, percent: u8) {
        self.post(DecoderEvent::Buffering {
            percent: percent.min(100),
        })
    }
}

/// A decoded frame in NV12 layout: a Y plane followed by an interleaved UV
/// plane starting at `uv_offset`.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub y_stride: u32,
    pub uv_stride: u32,
    pub uv_offset: usize,
}

impl VideoFrame {
    /// A tightly packed NV12 frame.
    pub fn packed(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            y_stride: width,
            uv_stride: width,
            uv_offset: width as usize * height as usize,
        }
    }
}

/// Something a surface can pull frames from.
pub trait FrameSource: Send + Sync {
    /// The most recent frame, if one was decoded.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Changes every time a new frame is stored. Readers compare it with the
    /// serial of the frame they last converted.
    fn frame_serial(&self) -> u64;
}

/// Render target a decoder exposes to attached surfaces.
#[derive(Clone)]
pub struct RenderTarget(Arc<dyn FrameSource>);

impl RenderTarget {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self(source)
    }

    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.0.current_frame()
    }

    pub fn frame_serial(&self) -> u64 {
        self.0.frame_serial()
    }

    /// Whether both handles point at the same decoder output.
    pub fn same_source(&self, other: &RenderTarget) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RenderTarget")
    }
}

/// A native media decoder owned by one player session.
///
/// All methods are called from the dispatcher thread. Asynchronous outcomes
/// (prepare, errors, end of media, buffering) go through the
/// [`DecoderCallbacks`] given to the [`DecoderFactory`].
pub trait Decoder {
    /// Drops any loaded source and returns to the idle state.
    fn reset(&mut self);

    /// Sets the data source. Fails synchronously if it cannot be opened.
    fn open(&mut self, source: &Source) -> Result<(), Error>;

    /// Starts preparing the opened source; completion is reported as
    /// [`DecoderEvent::Prepared`] or [`DecoderEvent::Error`].
    fn prepare_async(&mut self) -> Result<(), Error>;

    fn start(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    fn seek_to(&mut self, position_ms: u64);

    fn position_ms(&self) -> u64;

    fn duration_ms(&self) -> u64;

    /// Natural `(width, height)` of the video track.
    fn video_size(&self) -> (u32, u32);

    /// Sets the output volume, already combined with the mute state.
    fn set_volume(&mut self, volume: f32);

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn render_target(&self) -> Option<RenderTarget> {
        None
    }

    /// Puts the first frame on screen after preparing.
    fn show_preview(&mut self) {
        self.start();
        self.pause();
    }

    /// Frees the native resources. The decoder is not used afterwards.
    fn release(&mut self);
}

/// Builds one decoder per session.
pub trait DecoderFactory: Send {
    fn create(&mut self, callbacks: DecoderCallbacks) -> Result<Box<dyn Decoder>, Error>;
}

impl<F> DecoderFactory for F
where
    F: FnMut(DecoderCallbacks) -> Result<Box<dyn Decoder>, Error> + Send,
{
    fn create(&mut self, callbacks: DecoderCallbacks) -> Result<Box<dyn Decoder>, Error> {
        self(callbacks)
    }
}
