use std::env;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::canvas::FrameBuffer;
use crate::director::{DEFAULT_SURFACE_HEIGHT, DEFAULT_SURFACE_WIDTH};
use crate::playback::{FrameRequest, FrameScheduler, ManualScheduler};

use super::metrics::FrameStats;
use super::{MetricsHandle, Renderer};

pub const SLOW_FRAME_ENV_VAR: &str = "STORYPLAY_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub surface_width: u32,
    pub surface_height: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Storyplay".to_string(),
            window_width: 1280,
            window_height: 960,
            surface_width: DEFAULT_SURFACE_WIDTH,
            surface_height: DEFAULT_SURFACE_HEIGHT,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: Some(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFlow {
    Continue,
    Exit,
}

/// What the window drives. Every redraw calls [`FrameHost::frame`] with the
/// frame request that came due, if any, and presents the buffer afterwards.
pub trait FrameHost {
    fn start(&mut self, scheduler: &mut dyn FrameScheduler);
    fn frame(
        &mut self,
        due: Option<FrameRequest>,
        scheduler: &mut dyn FrameScheduler,
        canvas: &mut FrameBuffer,
    ) -> HostFlow;
    /// Text to show in the title bar, e.g. the current caption.
    fn title(&self) -> Option<String>;
    fn shutdown(&mut self);
}

pub fn run_window<H: FrameHost>(config: LoopConfig, host: H) -> Result<(), AppError> {
    run_window_with_metrics(config, host, MetricsHandle::default())
}

pub fn run_window_with_metrics<H: FrameHost>(
    config: LoopConfig,
    mut host: H,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(
        Arc::clone(&window),
        config.surface_width,
        config.surface_height,
    )
    .map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let metrics_log_interval = if config.metrics_log_interval.is_zero() {
        Duration::from_secs(1)
    } else {
        config.metrics_log_interval
    };
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let pacer = FramePacer::from_fps_cap(config.max_render_fps);

    info!(
        surface_width = config.surface_width,
        surface_height = config.surface_height,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %pacer,
        "loop_config"
    );

    let mut canvas = FrameBuffer::new(config.surface_width, config.surface_height);
    let mut scheduler = ManualScheduler::new();
    host.start(&mut scheduler);

    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut frame_stats = FrameStats::new(metrics_log_interval, pacer.target(), Instant::now());
    let mut last_applied_title: Option<String> = None;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if is_quit_key(event.physical_key, event.state) {
                        info!(reason = "escape_key", "shutdown_requested");
                        window_target.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    if slow_frame_delay > Duration::ZERO {
                        // Explicit debug perturbation only; this is not the FPS cap.
                        thread::sleep(slow_frame_delay);
                    }

                    let now = Instant::now();
                    let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                    last_frame_instant = now;

                    let wait = pacer.wait_before_present(
                        Instant::now().saturating_duration_since(last_present_instant),
                    );
                    if !wait.is_zero() {
                        thread::sleep(wait);
                    }

                    let due = scheduler.take_due();
                    let flow = host.frame(due, &mut scheduler, &mut canvas);

                    if let Err(error) = renderer.present(&canvas) {
                        warn!(error = %error, "renderer_draw_failed");
                        window_target.exit();
                    }
                    last_present_instant = Instant::now();

                    let next_title = host.title();
                    if next_title != last_applied_title {
                        match &next_title {
                            Some(caption) => window.set_title(&format!(
                                "{} | {}",
                                config.window_title, caption
                            )),
                            None => window.set_title(&config.window_title),
                        }
                        last_applied_title = next_title;
                    }

                    frame_stats.record(raw_frame_dt);
                    if let Some(snapshot) = frame_stats.roll(now) {
                        metrics_handle.publish(snapshot);
                        info!(
                            fps = snapshot.fps,
                            frame_time_ms = snapshot.frame_time_ms,
                            worst_frame_time_ms = snapshot.worst_frame_time_ms,
                            late_frames = snapshot.late_frames,
                            "loop_metrics"
                        );
                    }

                    if flow == HostFlow::Exit {
                        info!(reason = "presentation_complete", "shutdown_requested");
                        window_target.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            Event::LoopExiting => {
                host.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn is_quit_key(key: PhysicalKey, state: ElementState) -> bool {
    state == ElementState::Pressed && key == PhysicalKey::Code(KeyCode::Escape)
}

/// Holds presentation to at most `fps` frames per second. No cap means
/// present as fast as redraws arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FramePacer {
    fps: Option<u32>,
}

impl FramePacer {
    fn from_fps_cap(cap: Option<u32>) -> Self {
        Self {
            fps: cap.filter(|fps| *fps > 0),
        }
    }

    fn target(&self) -> Option<Duration> {
        self.fps.map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }

    fn wait_before_present(&self, since_last_present: Duration) -> Duration {
        self.target()
            .map_or(Duration::ZERO, |target| target.saturating_sub(since_last_present))
    }
}

impl fmt::Display for FramePacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fps {
            Some(fps) => write!(f, "{fps}"),
            None => f.write_str("off"),
        }
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    parse_slow_frame_delay(env::var(SLOW_FRAME_ENV_VAR), config_slow_frame_ms)
}

/// The environment value wins over the config when it parses.
fn parse_slow_frame_delay(
    value: Result<String, env::VarError>,
    config_slow_frame_ms: u64,
) -> Duration {
    match value {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "slow_frame_env_invalid"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "slow_frame_env_unreadable"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pressed_escape_quits() {
        assert!(is_quit_key(
            PhysicalKey::Code(KeyCode::Escape),
            ElementState::Pressed
        ));
        assert!(!is_quit_key(
            PhysicalKey::Code(KeyCode::Escape),
            ElementState::Released
        ));
        assert!(!is_quit_key(
            PhysicalKey::Code(KeyCode::Space),
            ElementState::Pressed
        ));
    }

    #[test]
    fn slow_frame_env_value_overrides_config() {
        assert_eq!(
            parse_slow_frame_delay(Ok(" 25 ".to_string()), 0),
            Duration::from_millis(25)
        );
        assert_eq!(
            parse_slow_frame_delay(Ok("fast".to_string()), 7),
            Duration::from_millis(7)
        );
        assert_eq!(
            parse_slow_frame_delay(Err(env::VarError::NotPresent), 3),
            Duration::from_millis(3)
        );
    }

    #[test]
    fn zero_cap_disables_pacing() {
        let pacer = FramePacer::from_fps_cap(Some(0));
        assert_eq!(pacer.target(), None);
        assert_eq!(pacer.wait_before_present(Duration::ZERO), Duration::ZERO);
        assert_eq!(pacer.to_string(), "off");
    }

    #[test]
    fn pacer_waits_out_the_rest_of_the_frame() {
        let pacer = FramePacer::from_fps_cap(Some(50));
        assert_eq!(pacer.target(), Some(Duration::from_millis(20)));
        assert_eq!(
            pacer.wait_before_present(Duration::from_millis(5)),
            Duration::from_millis(15)
        );
        assert_eq!(
            pacer.wait_before_present(Duration::from_millis(35)),
            Duration::ZERO
        );
        assert_eq!(pacer.to_string(), "50");
    }
}
