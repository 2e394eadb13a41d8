use crate::decoder::{RenderTarget, VideoFrame};
use crate::surface::{self, SurfaceSlot};
use gpui::{
    Element, ElementId, GlobalElementId, InspectorElementId, IntoElement, LayoutId, Window,
};
use image::{ImageBuffer, Rgba};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use yuv::{YuvBiPlanarImage, YuvConversionMode, YuvRange, YuvStandardMatrix, yuv_nv12_to_rgba};

/// The last converted frame of one render target.
struct Memo<I> {
    target: RenderTarget,
    serial: u64,
    value: I,
}

/// Keeps `value` while the target and its frame serial are unchanged.
fn memoize<I: Clone>(
    memo: &mut Option<Memo<I>>,
    target: &RenderTarget,
    build: impl FnOnce() -> Option<I>,
) -> Option<I> {
    let serial = target.frame_serial();
    if let Some(m) = memo.as_ref() {
        if m.serial == serial && m.target.same_source(target) {
            return Some(m.value.clone());
        }
    }
    *memo = None;
    let value = build()?;
    *memo = Some(Memo {
        target: target.clone(),
        serial,
        value: value.clone(),
    });
    Some(value)
}

/// Converted frame shared across repaints of one view.
///
/// Elements are rebuilt on every render, so the view owning the element
/// keeps this and hands it in with [`VideoElement::cache`].
#[derive(Clone, Default)]
pub struct FrameCache(Arc<Mutex<Option<Memo<ConvertedFrame>>>>);

/// A frame ready to paint, with its pixel size.
type ConvertedFrame = (Arc<gpui::RenderImage>, u32, u32);

impl FrameCache {
    /// The converted current frame of `target`, converting only when the
    /// target has stored a new frame since the last call.
    fn frame(&self, target: &RenderTarget) -> Option<ConvertedFrame> {
        memoize(&mut self.0.lock(), target, || {
            let frame = target.current_frame()?;
            let rgba = nv12_to_rgba(&frame)?;
            let buffer = ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, rgba)?;
            let frames: SmallVec<[image::Frame; 1]> =
                SmallVec::from_elem(image::Frame::new(buffer), 1);
            Some((
                Arc::new(gpui::RenderImage::new(frames)),
                frame.width,
                frame.height,
            ))
        })
    }

    fn clear(&self) {
        *self.0.lock() = None;
    }
}

/// Paints the render target of a [`SurfaceSlot`] using its fit mode.
pub struct VideoElement {
    slot: Arc<SurfaceSlot>,
    cache: FrameCache,
    display_width: Option<gpui::Pixels>,
    display_height: Option<gpui::Pixels>,
    element_id: Option<ElementId>,
}

impl VideoElement {
    pub fn new(slot: Arc<SurfaceSlot>) -> Self {
        Self {
            slot,
            cache: FrameCache::default(),
            display_width: None,
            display_height: None,
            element_id: None,
        }
    }

    pub fn id(mut self, id: impl Into<ElementId>) -> Self {
        self.element_id = Some(id.into());
        self
    }

    /// Reuses the converted frame from earlier paints until a new one arrives.
    pub fn cache(mut self, cache: FrameCache) -> Self {
        self.cache = cache;
        self
    }

    /// Fixes the element size. Without it the element fills its parent.
    pub fn size(mut self, width: gpui::Pixels, height: gpui::Pixels) -> Self {
        self.display_width = Some(width);
        self.display_height = Some(height);
        self
    }

    fn length(size: Option<gpui::Pixels>) -> gpui::Length {
        match size {
            Some(px) => gpui::Length::Definite(gpui::DefiniteLength::Absolute(
                gpui::AbsoluteLength::Pixels(px),
            )),
            None => gpui::Length::Definite(gpui::DefiniteLength::Fraction(1.0)),
        }
    }
}

/// Converts an NV12 frame to tightly packed RGBA.
///
/// Tries BT.709 full range, then BT.709 limited, then BT.601. Returns `None`
/// if the frame is shorter than its declared planes.
fn nv12_to_rgba(frame: &VideoFrame) -> Option<Vec<u8>> {
    let height = frame.height as usize;
    let y_len = frame.y_stride as usize * height;
    let uv_len = frame.uv_stride as usize * height.div_ceil(2);
    let uv_end = frame.uv_offset + uv_len;
    if frame.data.len() < y_len || frame.data.len() < uv_end {
        return None;
    }

    let image = YuvBiPlanarImage {
        y_plane: &frame.data[..y_len],
        y_stride: frame.y_stride,
        uv_plane: &frame.data[frame.uv_offset..uv_end],
        uv_stride: frame.uv_stride,
        width: frame.width,
        height: frame.height,
    };

    let rgba_stride = frame.width * 4;
    let mut rgba = vec![0u8; rgba_stride as usize * height];
    let attempts = [
        (YuvRange::Full, YuvStandardMatrix::Bt709),
        (YuvRange::Limited, YuvStandardMatrix::Bt709),
        (YuvRange::Limited, YuvStandardMatrix::Bt601),
    ];
    for (range, matrix) in attempts {
        if yuv_nv12_to_rgba(
            &image,
            &mut rgba,
            rgba_stride,
            range,
            matrix,
            YuvConversionMode::Balanced,
        )
        .is_ok()
        {
            return Some(rgba);
        }
    }
    log::warn!("could not convert {}x{} frame", frame.width, frame.height);
    None
}

impl Element for VideoElement {
    type RequestLayoutState = ();
    type PrepaintState = ();

    fn id(&self) -> Option<ElementId> {
        self.element_id.clone()
    }

    fn source_location(&self) -> Option<&'static core::panic::Location<'static>> {
        None
    }

    fn request_layout(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        window: &mut Window,
        cx: &mut gpui::App,
    ) -> (LayoutId, Self::RequestLayoutState) {
        let style = gpui::Style {
            size: gpui::Size {
                width: Self::length(self.display_width),
                height: Self::length(self.display_height),
            },
            ..Default::default()
        };
        (window.request_layout(style, [], cx), ())
    }

    fn prepaint(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        _bounds: gpui::Bounds<gpui::Pixels>,
        _request_layout_state: &mut Self::RequestLayoutState,
        window: &mut Window,
        _cx: &mut gpui::App,
    ) -> Self::PrepaintState {
        // Frames arrive off the UI thread, so keep polling while a target is bound.
        let redraw = self.slot.take_redraw();
        if redraw || self.slot.is_ready() {
            window.request_animation_frame();
        }
    }

    fn paint(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        bounds: gpui::Bounds<gpui::Pixels>,
        _request_layout_state: &mut Self::RequestLayoutState,
        _prepaint_state: &mut Self::PrepaintState,
        window: &mut Window,
        _cx: &mut gpui::App,
    ) {
        let Some(target) = self.slot.target() else {
            self.cache.clear();
            return;
        };
        let Some((render_image, width, height)) = self.cache.frame(&target) else {
            return;
        };

        let mode = self.slot.applied_fit_mode().unwrap_or_else(|| self.slot.fit_mode());
        let rect = mode.fit(
            surface::Size::new(width as f32, height as f32),
            surface::Size::new(f32::from(bounds.size.width), f32::from(bounds.size.height)),
        );
        let image_bounds = gpui::Bounds {
            origin: gpui::point(
                bounds.origin.x + gpui::px(rect.x),
                bounds.origin.y + gpui::px(rect.y),
            ),
            size: gpui::size(gpui::px(rect.width), gpui::px(rect.height)),
        };

        window.with_content_mask(Some(gpui::ContentMask { bounds }), |window| {
            if let Err(err) =
                window.paint_image(image_bounds, gpui::Corners::default(), render_image, 0, false)
            {
                log::warn!("failed to paint video frame: {err}");
            }
        });
    }
}

impl IntoElement for VideoElement {
    type Element = Self;

    fn into_element(self) -> Self::Element {
        self
    }
}

/// Builds a [`VideoElement`] over `slot`.
pub fn video(slot: Arc<SurfaceSlot>) -> VideoElement {
    VideoElement::new(slot)
}
