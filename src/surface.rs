use crate::decoder::RenderTarget;
use crate::{Error, SessionId};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// How decoded frames map onto the surface's display area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FitMode {
    /// Natural size, anchored at the top-left corner.
    None,
    /// Stretched to fill the area, ignoring aspect ratio.
    #[default]
    StretchToFill,
    /// Scaled to fit inside the area, letterboxed.
    FitPreservingAspect,
    /// Scaled to cover the area, cropped.
    FillPreservingAspect,
}

impl FitMode {
    pub const ALL: [FitMode; 4] = [
        FitMode::None,
        FitMode::StretchToFill,
        FitMode::FitPreservingAspect,
        FitMode::FillPreservingAspect,
    ];

    /// View-manager constant for this mode.
    pub fn constant(self) -> &'static str {
        match self {
            FitMode::None => "ScaleNone",
            FitMode::StretchToFill => "ScaleToFill",
            FitMode::FitPreservingAspect => "ScaleAspectFit",
            FitMode::FillPreservingAspect => "ScaleAspectFill",
        }
    }

    pub fn from_constant(constant: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.constant() == constant)
            .ok_or_else(|| Error::UnknownFitMode(constant.to_string()))
    }

    /// Places `content` inside `container`, returning the destination rectangle.
    ///
    /// The rectangle may extend past the container for
    /// [`FitMode::FillPreservingAspect`] and [`FitMode::None`]; callers clip.
    pub fn fit(self, content: Size, container: Size) -> Rect {
        if content.is_empty() {
            return Rect::from_size(container);
        }

        match self {
            FitMode::None => Rect::from_size(content),
            FitMode::StretchToFill => Rect::from_size(container),
            FitMode::FitPreservingAspect | FitMode::FillPreservingAspect => {
                let sx = container.width / content.width;
                let sy = container.height / content.height;
                let scale = if self == FitMode::FitPreservingAspect {
                    sx.min(sy)
                } else {
                    sx.max(sy)
                };
                let width = content.width * scale;
                let height = content.height * scale;
                Rect {
                    x: (container.width - width) / 2.0,
                    y: (container.height - height) / 2.0,
                    width,
                    height,
                }
            }
        }
    }
}

/// Accepts the script-side names (`none`, `stretch`, `contain`, `cover`).
impl FromStr for FitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FitMode::None),
            "stretch" => Ok(FitMode::StretchToFill),
            "contain" => Ok(FitMode::FitPreservingAspect),
            "cover" => Ok(FitMode::FillPreservingAspect),
            other => Err(Error::UnknownFitMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    fn from_size(size: Size) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
        }
    }
}

/// What a surface learns when its session becomes ready.
#[derive(Debug, Clone)]
pub struct ReadyInfo {
    pub session: SessionId,
    pub width: u32,
    pub height: u32,
    pub target: Option<RenderTarget>,
}

/// A render target attachable to one player session.
///
/// Called from the dispatcher thread; implementations keep their own state
/// behind interior mutability.
pub trait Surface: Send + Sync {
    /// The session prepared a source; apply the pending fit mode.
    fn on_ready(&self, info: &ReadyInfo);

    /// The session was torn down; drop the render target but stay usable.
    fn on_destroyed(&self);

    fn apply_fit_mode(&self, mode: FitMode);
}

#[derive(Debug, Default)]
struct SlotState {
    fit_mode: FitMode,
    applied: Option<FitMode>,
    session: Option<SessionId>,
    target: Option<RenderTarget>,
    video_size: (u32, u32),
    ready: bool,
}

/// Reusable surface state for UI views.
///
/// Holds the pending fit mode, the current render target and a redraw flag
/// the owning view polls.
#[derive(Debug, Default)]
pub struct SurfaceSlot {
    state: Mutex<SlotState>,
    redraw: AtomicBool,
}

impl SurfaceSlot {
    pub fn new(fit_mode: FitMode) -> Self {
        Self {
            state: Mutex::new(SlotState {
                fit_mode,
                ..Default::default()
            }),
            redraw: AtomicBool::new(false),
        }
    }

    /// Stores the mode and applies it right away if a session is ready.
    pub fn set_fit_mode(&self, mode: FitMode) {
        let ready = {
            let mut state = self.state.lock();
            state.fit_mode = mode;
            state.ready
        };
        if ready {
            self.apply_fit_mode(mode);
        }
    }

    pub fn fit_mode(&self) -> FitMode {
        self.state.lock().fit_mode
    }

    /// The mode last applied to a ready render target.
    pub fn applied_fit_mode(&self) -> Option<FitMode> {
        self.state.lock().applied
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn session(&self) -> Option<SessionId> {
        self.state.lock().session.clone()
    }

    pub fn target(&self) -> Option<RenderTarget> {
        self.state.lock().target.clone()
    }

    pub fn video_size(&self) -> (u32, u32) {
        self.state.lock().video_size
    }

    /// Returns whether the view should redraw, clearing the flag.
    pub fn take_redraw(&self) -> bool {
        self.redraw.swap(false, Ordering::SeqCst)
    }
}

impl Surface for SurfaceSlot {
    fn on_ready(&self, info: &ReadyInfo) {
        let mode = {
            let mut state = self.state.lock();
            state.ready = true;
            state.session = Some(info.session.clone());
            state.target = info.target.clone();
            state.video_size = (info.width, info.height);
            state.fit_mode
        };
        self.apply_fit_mode(mode);
    }

    fn on_destroyed(&self) {
        let mut state = self.state.lock();
        state.ready = false;
        state.target = None;
        state.session = None;
        state.applied = None;
        self.redraw.store(true, Ordering::SeqCst);
    }

    fn apply_fit_mode(&self, mode: FitMode) {
        let mut state = self.state.lock();
        if !state.ready {
            log::warn!("fit mode {mode:?} applied to a surface without a ready player");
            return;
        }
        state.applied = Some(mode);
        self.redraw.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const VIDEO: Size = Size { width: 1920.0, height: 1080.0 };
    const SQUARE: Size = Size { width: 400.0, height: 400.0 };

    fn ready(id: &str) -> ReadyInfo {
        ReadyInfo {
            session: SessionId::from(id),
            width: 1920,
            height: 1080,
            target: None,
        }
    }

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-3, "{a} != {b}");
    }

    #[test]
    fn contain_letterboxes_vertically() {
        let rect = FitMode::FitPreservingAspect.fit(VIDEO, SQUARE);
        assert_close(rect.width, 400.0);
        assert_close(rect.height, 225.0);
        assert_close(rect.x, 0.0);
        assert_close(rect.y, 87.5);
    }

    #[test]
    fn cover_crops_horizontally() {
        let rect = FitMode::FillPreservingAspect.fit(VIDEO, SQUARE);
        assert_close(rect.height, 400.0);
        assert_close(rect.width, 711.111);
        assert!(rect.x < 0.0);
        assert_close(rect.y, 0.0);
    }

    #[test]
    fn stretch_and_none() {
        assert_eq!(
            FitMode::StretchToFill.fit(VIDEO, SQUARE),
            Rect { x: 0.0, y: 0.0, width: 400.0, height: 400.0 }
        );
        assert_eq!(
            FitMode::None.fit(VIDEO, SQUARE),
            Rect { x: 0.0, y: 0.0, width: 1920.0, height: 1080.0 }
        );
    }

    #[test]
    fn empty_content_fills_container() {
        let rect = FitMode::FitPreservingAspect.fit(Size::default(), SQUARE);
        assert_eq!(rect, Rect { x: 0.0, y: 0.0, width: 400.0, height: 400.0 });
    }

    #[rstest]
    #[case("none", FitMode::None)]
    #[case("stretch", FitMode::StretchToFill)]
    #[case("contain", FitMode::FitPreservingAspect)]
    #[case("cover", FitMode::FillPreservingAspect)]
    fn parses_script_names(#[case] name: &str, #[case] mode: FitMode) {
        assert_eq!(name.parse::<FitMode>().unwrap(), mode);
        assert_eq!(FitMode::from_constant(mode.constant()).unwrap(), mode);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!("zoom".parse::<FitMode>().is_err());
        assert!(FitMode::from_constant("ScaleZoom").is_err());
    }

    #[test]
    fn pending_mode_is_applied_on_ready() {
        let slot = SurfaceSlot::new(FitMode::FitPreservingAspect);
        slot.apply_fit_mode(FitMode::None);
        assert_eq!(slot.applied_fit_mode(), None);

        slot.on_ready(&ready("p1"));
        assert_eq!(slot.applied_fit_mode(), Some(FitMode::FitPreservingAspect));
        assert!(slot.take_redraw());
        assert!(!slot.take_redraw());

        slot.set_fit_mode(FitMode::FillPreservingAspect);
        assert_eq!(slot.applied_fit_mode(), Some(FitMode::FillPreservingAspect));
    }

    #[test]
    fn destroyed_clears_target_but_keeps_mode() {
        let slot = SurfaceSlot::new(FitMode::FillPreservingAspect);
        slot.on_ready(&ready("p1"));
        slot.on_destroyed();

        assert!(!slot.is_ready());
        assert!(slot.target().is_none());
        assert_eq!(slot.session(), None);
        assert_eq!(slot.fit_mode(), FitMode::FillPreservingAspect);

        slot.on_ready(&ready("p2"));
        assert_eq!(slot.session(), Some(SessionId::from("p2")));
    }
}
