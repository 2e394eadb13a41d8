use avplayer_bridge::video::GstDecoderFactory;
use avplayer_bridge::{
    Config, EventKind, EventSubscription, FitMode, PlayerHandle, SessionId, Source,
    VideoSurfaceView,
};
use gpui::{App, Application, Context, Entity, Render, Window, WindowOptions, div, prelude::*};
use std::path::PathBuf;

struct PlayerDemo {
    player: PlayerHandle,
    session: SessionId,
    events: EventSubscription,
    surface: Entity<VideoSurfaceView>,
    paused: bool,
    position: f64,
    duration: f64,
}

impl PlayerDemo {
    fn poll_events(&mut self) {
        for event in self.events.drain() {
            match event.kind {
                EventKind::Load { duration, .. } => self.duration = duration,
                EventKind::Progress { current_time, .. } => self.position = current_time,
                EventKind::Seek { current_time, .. } => self.position = current_time,
                EventKind::End => self.paused = true,
                EventKind::Error { code, extra_code } => {
                    log::error!("playback failed: {code}/{extra_code}")
                }
                EventKind::LoadStart { .. } => {}
            }
        }
    }

    fn seek_by(&mut self, delta: f64) {
        self.poll_events();
        let target = (self.position + delta).clamp(0.0, self.duration);
        if let Err(err) = self.player.set_seek(&self.session, target) {
            log::error!("seek failed: {err}");
        }
    }

    fn toggle(&mut self) {
        self.poll_events();
        self.paused = !self.paused;
        if let Err(err) = self.player.set_paused(&self.session, self.paused) {
            log::error!("toggle failed: {err}");
        }
    }

    fn cycle_fit_mode(&mut self, cx: &mut Context<Self>) {
        self.surface.update(cx, |view, _| {
            let next = match view.fit_mode() {
                FitMode::FitPreservingAspect => FitMode::FillPreservingAspect,
                FitMode::FillPreservingAspect => FitMode::StretchToFill,
                FitMode::StretchToFill => FitMode::None,
                FitMode::None => FitMode::FitPreservingAspect,
            };
            view.set_fit_mode(next);
        });
    }
}

fn button(id: &'static str, label: &'static str) -> gpui::Stateful<gpui::Div> {
    div()
        .id(id)
        .px_6()
        .py_3()
        .border_1()
        .cursor_pointer()
        .child(label)
}

impl Render for PlayerDemo {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.poll_events();
        window.request_animation_frame();
        let play_label = if self.paused { "Play" } else { "Pause" };

        let controls = div()
            .flex()
            .items_center()
            .gap_3()
            .child(button("btn-back", "-5s").on_click(cx.listener(
                |this: &mut Self, _event, _window, cx| {
                    this.seek_by(-5.0);
                    cx.notify();
                },
            )))
            .child(button("btn-play-pause", play_label).on_click(cx.listener(
                |this: &mut Self, _event, _window, cx| {
                    this.toggle();
                    cx.notify();
                },
            )))
            .child(button("btn-forward", "+5s").on_click(cx.listener(
                |this: &mut Self, _event, _window, cx| {
                    this.seek_by(5.0);
                    cx.notify();
                },
            )))
            .child(button("btn-fit", "Fit").on_click(cx.listener(
                |this: &mut Self, _event, _window, cx| {
                    this.cycle_fit_mode(cx);
                    cx.notify();
                },
            )));

        div()
            .size_full()
            .flex()
            .flex_col()
            .child(div().flex_1().child(self.surface.clone()))
            .child(div().flex().justify_center().p_2().child(controls))
    }
}

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/sample.mp4"));
    let uri = avplayer_bridge::Url::from_file_path(&path).expect("path must be absolute");

    let factory = GstDecoderFactory::new().expect("failed to initialize gstreamer");
    let player = avplayer_bridge::spawn(factory, Config::default()).expect("failed to spawn player");
    let session = player.create_session(SessionId::generate()).expect("failed to create session");
    let events = player.subscribe(Some(session.clone()));
    player
        .set_source(&session, Source::from_uri(uri.as_str(), None))
        .expect("failed to load source");

    Application::new().run(move |cx: &mut App| {
        let _ = cx.open_window(
            WindowOptions {
                focus: true,
                ..Default::default()
            },
            |_, cx| {
                let surface = cx.new(|_| {
                    let mut view = VideoSurfaceView::new(FitMode::FitPreservingAspect);
                    if let Err(err) = view.attach(&player, &session) {
                        log::error!("failed to attach surface: {err}");
                    }
                    view
                });
                cx.new(|_| PlayerDemo {
                    player: player.clone(),
                    session: session.clone(),
                    events,
                    surface,
                    paused: true,
                    position: 0.0,
                    duration: 0.0,
                })
            },
        );
        cx.activate(true);
    });
}
