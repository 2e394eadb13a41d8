use crate::element::{FrameCache, video};
use crate::surface::{FitMode, Surface, SurfaceSlot};
use crate::{Attachment, Error, PlayerHandle, SessionId};
use gpui::{Context, IntoElement, Render, Window, div, prelude::*};
use std::sync::Arc;

/// A gpui view that shows whichever session it is attached to.
///
/// Attaching to another session replaces the previous attachment. The view
/// stays usable after its session is removed and can be attached again.
pub struct VideoSurfaceView {
    slot: Arc<SurfaceSlot>,
    frames: FrameCache,
    attachment: Option<Attachment>,
}

impl VideoSurfaceView {
    pub fn new(fit_mode: FitMode) -> Self {
        Self {
            slot: Arc::new(SurfaceSlot::new(fit_mode)),
            frames: FrameCache::default(),
            attachment: None,
        }
    }

    /// Shows session `id`. An existing attachment is moved, so the view stops
    /// painting the old session before the new one is ready.
    pub fn attach(&mut self, player: &PlayerHandle, id: &SessionId) -> Result<(), Error> {
        match &mut self.attachment {
            Some(attachment) => attachment.rebind(id),
            None => {
                let surface: Arc<dyn Surface> = self.slot.clone();
                self.attachment = Some(player.attach_surface(id, &surface)?);
                Ok(())
            }
        }
    }

    pub fn detach(&mut self) {
        self.attachment = None;
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.attachment.as_ref().map(Attachment::session)
    }

    pub fn set_fit_mode(&mut self, mode: FitMode) {
        self.slot.set_fit_mode(mode);
    }

    pub fn fit_mode(&self) -> FitMode {
        self.slot.fit_mode()
    }

    pub fn slot(&self) -> &Arc<SurfaceSlot> {
        &self.slot
    }
}

impl Default for VideoSurfaceView {
    fn default() -> Self {
        Self::new(FitMode::default())
    }
}

impl Render for VideoSurfaceView {
    fn render(&mut self, _window: &mut Window, _cx: &mut Context<Self>) -> impl IntoElement {
        div()
            .size_full()
            .overflow_hidden()
            .child(
                video(self.slot.clone())
                    .cache(self.frames.clone())
                    .id("avplayer-surface"),
            )
    }
}
