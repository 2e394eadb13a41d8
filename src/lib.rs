//! # AVPlayer bridge
//!
//! A scriptable video player primitive for host applications: sessions are
//! created and driven by id, decoding is delegated to a native media backend
//! and frames are shown by attachable render surfaces.
//!
//! ## Features
//!
//! - Session registry keyed by opaque ids (create, configure, remove)
//! - Play/pause, seek, volume and mute, repeat, rate
//! - Load, progress, seek, end and error events for script listeners
//! - Surfaces that follow a session's ready/destroyed lifecycle with a fit mode
//! - Single dispatcher thread; decoder callbacks are marshalled onto it
//! - GStreamer decoder (`gstreamer` feature) and gpui surface (`gpui` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use avplayer_bridge::{Config, Source, spawn};
//! use avplayer_bridge::video::GstDecoderFactory;
//!
//! let player = spawn(GstDecoderFactory::new()?, Config::default())?;
//! let id = player.create_session("p1")?;
//! let events = player.subscribe(Some(id.clone()));
//! player.set_source(&id, Source::from_uri("https://example.com/clip.mp4", None))?;
//! player.play(&id)?;
//! ```

mod config;
pub mod decoder;
mod dispatcher;
mod error;
pub mod events;
mod registry;
mod session;
mod source;
pub mod surface;

#[cfg(test)]
mod mock;

#[cfg(feature = "gpui")]
mod element;
#[cfg(feature = "gstreamer")]
pub mod video;
#[cfg(feature = "gpui")]
mod view;

pub use config::Config;
pub use decoder::{Decoder, DecoderCallbacks, DecoderEvent, DecoderFactory, RenderTarget};
pub use dispatcher::{Attachment, PlayerHandle, spawn};
pub use error::Error;
pub use events::{EventKind, EventSubscription, PlayerEvent};
pub use registry::{ObserverToken, SessionRegistry};
pub use session::{PlayerSession, SessionId, SessionSnapshot};
pub use source::Source;
pub use surface::{FitMode, Surface, SurfaceSlot};

#[cfg(feature = "gpui")]
pub use element::{FrameCache, VideoElement, video};
#[cfg(feature = "gpui")]
pub use view::VideoSurfaceView;

pub use url::Url;
#[cfg(feature = "gstreamer")]
pub use gstreamer as gst;
