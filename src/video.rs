//! GStreamer-backed [`Decoder`].

use crate::Error;
use crate::Source;
use crate::decoder::{
    Decoder, DecoderCallbacks, DecoderFactory, FrameSource, MEDIA_ERROR_UNKNOWN, RenderTarget,
    VideoFrame,
};
use glib::translate::IntoGlib;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_app::prelude::*;
use gstreamer_video as gst_video;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

const VIDEO_SINK_NAME: &str = "avplayer_video";

#[derive(Debug)]
struct Frame {
    sample: gst::Sample,
    info: Option<gst_video::VideoInfo>,
}

impl Frame {
    fn empty() -> Self {
        Self {
            sample: gst::Sample::builder().build(),
            info: None,
        }
    }

    fn to_video_frame(&self) -> Option<VideoFrame> {
        let info = self.info.as_ref()?;
        let map = self.sample.buffer()?.map_readable().ok()?;
        let data = map.as_slice();
        if data.is_empty() {
            return None;
        }
        Some(VideoFrame {
            data: data.to_vec(),
            width: info.width(),
            height: info.height(),
            y_stride: info.stride()[0] as u32,
            uv_stride: info.stride()[1] as u32,
            uv_offset: info.offset()[1],
        })
    }
}

/// Latest decoded frame, shared between the pull thread and surfaces.
#[derive(Debug)]
struct FrameSlot {
    frame: Mutex<Frame>,
    serial: AtomicU64,
}

impl FrameSlot {
    fn new() -> Self {
        Self {
            frame: Mutex::new(Frame::empty()),
            serial: AtomicU64::new(0),
        }
    }

    fn store(&self, frame: Frame) {
        *self.frame.lock() = frame;
        self.serial.fetch_add(1, Ordering::AcqRel);
    }

    /// Stores a pulled sample unless it carries the buffer already held;
    /// a paused pipeline hands out the same preroll buffer on every pull.
    fn store_sample(&self, sample: gst::Sample) {
        let held = self.frame.lock().sample.buffer().map(|b| b.as_ptr());
        if held.is_some() && held == sample.buffer().map(|b| b.as_ptr()) {
            return;
        }
        let info = sample
            .caps()
            .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok());
        self.store(Frame { sample, info });
    }

    fn clear(&self) {
        self.store(Frame::empty());
    }
}

impl FrameSource for FrameSlot {
    fn current_frame(&self) -> Option<VideoFrame> {
        self.frame.lock().to_video_frame()
    }

    fn frame_serial(&self) -> u64 {
        self.serial.load(Ordering::Acquire)
    }
}

/// One loaded source: the playbin and the threads serving it.
#[derive(Debug)]
struct Pipeline {
    source: gst::Pipeline,
    video_sink: gst_app::AppSink,
    alive: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    fn open(
        uri: &url::Url,
        volume: f64,
        frames: &Arc<FrameSlot>,
        callbacks: &DecoderCallbacks,
    ) -> Result<Self, Error> {
        let sink_bin = gst::parse::bin_from_description(
            &format!(
                "videoscale ! videoconvert ! appsink name={VIDEO_SINK_NAME} drop=true max-buffers=1 caps=video/x-raw,format=NV12,pixel-aspect-ratio=1/1"
            ),
            true,
        )?;
        let video_sink = sink_bin
            .by_name(VIDEO_SINK_NAME)
            .ok_or(Error::Cast)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Cast)?;

        let source = gst::ElementFactory::make("playbin")
            .property("uri", uri.as_str())
            .property("video-sink", &sink_bin)
            .property("volume", volume)
            .build()?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Cast)?;
        let bus = source.bus().ok_or(Error::Cast)?;

        let alive = Arc::new(AtomicBool::new(true));
        let workers = vec![
            spawn_bus_watch(bus, Arc::clone(&alive), callbacks.pinned()),
            spawn_frame_pull(
                source.clone(),
                video_sink.clone(),
                Arc::clone(&alive),
                Arc::clone(frames),
            ),
        ];

        Ok(Self {
            source,
            video_sink,
            alive,
            workers,
        })
    }

    fn set_state(&self, state: gst::State) {
        if let Err(err) = self.source.set_state(state) {
            log::error!("failed to set pipeline to {state:?}: {err}");
        }
    }

    fn shutdown(mut self) {
        let _ = self.source.set_state(gst::State::Null);
        self.alive.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.join() {
                match err.downcast_ref::<String>() {
                    Some(e) => log::error!("video thread panicked: {e}"),
                    None => log::error!("video thread panicked with unknown reason"),
                }
            }
        }
    }
}

/// Forwards bus messages to the session as decoder callbacks.
fn spawn_bus_watch(
    bus: gst::Bus,
    alive: Arc<AtomicBool>,
    callbacks: DecoderCallbacks,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        // AsyncDone also follows every flushing seek; only the first one means prepared.
        let mut prepared = false;

        while alive.load(Ordering::Acquire) {
            let Some(msg) = bus.timed_pop_filtered(
                gst::ClockTime::from_mseconds(100),
                &[
                    gst::MessageType::AsyncDone,
                    gst::MessageType::Error,
                    gst::MessageType::Eos,
                    gst::MessageType::Buffering,
                ],
            ) else {
                continue;
            };

            match msg.view() {
                gst::MessageView::AsyncDone(_) if !prepared => {
                    prepared = true;
                    callbacks.prepared();
                }
                gst::MessageView::Error(err) => {
                    log::error!("gstreamer error: {} ({:?})", err.error(), err.debug());
                    let (what, extra) = error_codes(&err.error());
                    callbacks.error(what, extra);
                }
                gst::MessageView::Eos(_) => callbacks.completion(),
                gst::MessageView::Buffering(buffering) => {
                    callbacks.buffering(buffering.percent().clamp(0, 100) as u8);
                }
                _ => {}
            }
        }
    })
}

/// Keeps the latest sample from the appsink in `frames`.
fn spawn_frame_pull(
    pipeline: gst::Pipeline,
    video_sink: gst_app::AppSink,
    alive: Arc<AtomicBool>,
    frames: Arc<FrameSlot>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while alive.load(Ordering::Acquire) {
            let sample = if pipeline.state(gst::ClockTime::ZERO).1 != gst::State::Playing {
                video_sink.try_pull_preroll(gst::ClockTime::from_mseconds(16))
            } else {
                video_sink.try_pull_sample(gst::ClockTime::from_mseconds(16))
            };
            if let Some(sample) = sample {
                frames.store_sample(sample);
            }
        }
    })
}

/// Maps a GStreamer error to a `(domain, code)` pair.
fn error_codes(err: &glib::Error) -> (i32, i32) {
    if let Some(code) = err.kind::<gst::CoreError>() {
        (1, code.into_glib())
    } else if let Some(code) = err.kind::<gst::LibraryError>() {
        (2, code.into_glib())
    } else if let Some(code) = err.kind::<gst::ResourceError>() {
        (3, code.into_glib())
    } else if let Some(code) = err.kind::<gst::StreamError>() {
        (4, code.into_glib())
    } else {
        (MEDIA_ERROR_UNKNOWN, 0)
    }
}

/// A decoder driving a `playbin` pipeline with an NV12 appsink.
#[derive(Debug)]
pub struct GstDecoder {
    callbacks: DecoderCallbacks,
    frames: Arc<FrameSlot>,
    pipeline: Option<Pipeline>,
    volume: f64,
}

impl GstDecoder {
    pub fn new(callbacks: DecoderCallbacks) -> Self {
        Self {
            callbacks,
            frames: Arc::new(FrameSlot::new()),
            pipeline: None,
            volume: 1.0,
        }
    }

    /// The underlying GStreamer pipeline of the loaded source.
    pub fn pipeline(&self) -> Option<gst::Pipeline> {
        self.pipeline.as_ref().map(|p| p.source.clone())
    }
}

impl Decoder for GstDecoder {
    fn reset(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
        self.frames.clear();
    }

    fn open(&mut self, source: &Source) -> Result<(), Error> {
        let uri = source.url()?;
        let pipeline = Pipeline::open(&uri, self.volume, &self.frames, &self.callbacks)
            .map_err(|e| Error::SourceLoad {
                uri: source.uri.clone(),
                reason: e.to_string(),
            })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn prepare_async(&mut self) -> Result<(), Error> {
        let pipeline = self.pipeline.as_ref().ok_or(Error::NoSource)?;
        pipeline.source.set_state(gst::State::Paused)?;
        Ok(())
    }

    fn start(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.set_state(gst::State::Playing);
        }
    }

    fn pause(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.set_state(gst::State::Paused);
        }
    }

    fn is_playing(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|p| {
            let (_, current, pending) = p.source.state(gst::ClockTime::ZERO);
            current == gst::State::Playing || pending == gst::State::Playing
        })
    }

    fn seek_to(&mut self, position_ms: u64) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        if let Err(err) = pipeline.source.seek_simple(
            gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
            gst::ClockTime::from_mseconds(position_ms),
        ) {
            log::warn!("seek to {position_ms}ms failed: {err}");
        }
    }

    fn position_ms(&self) -> u64 {
        self.pipeline
            .as_ref()
            .and_then(|p| p.source.query_position::<gst::ClockTime>())
            .map_or(0, |pos| pos.mseconds())
    }

    fn duration_ms(&self) -> u64 {
        self.pipeline
            .as_ref()
            .and_then(|p| p.source.query_duration::<gst::ClockTime>())
            .map_or(0, |duration| duration.mseconds())
    }

    fn video_size(&self) -> (u32, u32) {
        let Some(pipeline) = &self.pipeline else {
            return (0, 0);
        };
        let caps = pipeline
            .video_sink
            .static_pad("sink")
            .and_then(|pad| pad.current_caps());
        let Some(s) = caps.as_ref().and_then(|caps| caps.structure(0)) else {
            return (0, 0);
        };
        match (s.get::<i32>("width"), s.get::<i32>("height")) {
            (Ok(width), Ok(height)) => (width.max(0) as u32, height.max(0) as u32),
            _ => (0, 0),
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = f64::from(volume);
        if let Some(pipeline) = &self.pipeline {
            pipeline.source.set_property("volume", self.volume);
        }
    }

    fn render_target(&self) -> Option<RenderTarget> {
        Some(RenderTarget::new(self.frames.clone()))
    }

    // The prerolled pipeline already holds the first frame.
    fn show_preview(&mut self) {}

    fn release(&mut self) {
        self.reset();
    }
}

impl Drop for GstDecoder {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Creates a [`GstDecoder`] per session.
#[derive(Debug)]
pub struct GstDecoderFactory(());

impl GstDecoderFactory {
    /// Initializes GStreamer.
    pub fn new() -> Result<Self, Error> {
        gst::init()?;
        Ok(Self(()))
    }
}

impl DecoderFactory for GstDecoderFactory {
    fn create(&mut self, callbacks: DecoderCallbacks) -> Result<Box<dyn Decoder>, Error> {
        Ok(Box::new(GstDecoder::new(callbacks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionId;

    fn decoder() -> GstDecoder {
        gst::init().unwrap();
        let (tx, _rx) = crossbeam_channel::unbounded();
        GstDecoder::new(DecoderCallbacks::new(SessionId::from("p1"), tx))
    }

    #[test]
    fn prepare_without_source_is_reported_as_such() {
        let mut decoder = decoder();
        assert!(matches!(decoder.prepare_async(), Err(Error::NoSource)));
        assert_eq!(decoder.duration_ms(), 0);
        assert_eq!(decoder.video_size(), (0, 0));
    }

    #[test]
    fn reset_bumps_the_frame_serial() {
        let mut decoder = decoder();
        let target = decoder.render_target().unwrap();
        let before = target.frame_serial();
        decoder.reset();
        assert_ne!(target.frame_serial(), before);
        assert!(target.current_frame().is_none());
    }
}
