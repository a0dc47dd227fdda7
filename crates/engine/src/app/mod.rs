mod loop_runner;
mod metrics;
mod rendering;

pub use loop_runner::{
    run_window, run_window_with_metrics, AppError, FrameHost, HostFlow, LoopConfig,
    SLOW_FRAME_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::Renderer;
