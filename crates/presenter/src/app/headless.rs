use std::io::{self, Write};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scene_engine::{Clock, FrameBuffer, HostFlow, ManualClock, ManualScheduler};
use tracing::{info, warn};

use super::stage::{Stage, StageReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SimulationOptions {
    pub(crate) fps: u32,
    pub(crate) jitter_ms: u64,
    pub(crate) max_seconds: u64,
    pub(crate) seed: Option<u64>,
    pub(crate) json: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            fps: 60,
            jitter_ms: 0,
            max_seconds: 600,
            seed: None,
            json: false,
        }
    }
}

impl SimulationOptions {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Drives a stage on a manual clock: every step advances time by one frame
/// interval plus optional jitter and delivers the frame that was requested.
pub(crate) fn simulate(
    mut stage: Stage<ManualClock>,
    clock: &ManualClock,
    surface: (u32, u32),
    options: SimulationOptions,
) -> StageReport {
    let mut scheduler = ManualScheduler::new();
    let mut canvas = FrameBuffer::new(surface.0, surface.1);
    let mut jitter = StdRng::seed_from_u64(options.seed.unwrap_or_default());
    let interval = options.frame_interval();
    let limit = Duration::from_secs(options.max_seconds);

    info!(
        fps = options.fps,
        jitter_ms = options.jitter_ms,
        max_seconds = options.max_seconds,
        "simulation_started"
    );
    stage.begin(&mut scheduler);

    let mut steps = 0u64;
    while !stage.is_done() {
        if clock.now() >= limit {
            warn!(
                elapsed_ms = clock.now().as_millis() as u64,
                "simulation_time_limit_reached"
            );
            break;
        }
        let extra = if options.jitter_ms > 0 {
            Duration::from_millis(jitter.gen_range(0..=options.jitter_ms))
        } else {
            Duration::ZERO
        };
        clock.advance(interval + extra);
        steps += 1;

        let due = scheduler.take_due();
        if stage.advance(due, &mut scheduler, &mut canvas) == HostFlow::Exit {
            break;
        }
    }

    let report = stage.finish();
    info!(
        steps,
        simulated_ms = clock.now().as_millis() as u64,
        scenes_played = report.scenes_played,
        "simulation_finished"
    );
    report
}

pub(crate) fn write_report<W: Write>(
    out: &mut W,
    report: &StageReport,
    json: bool,
) -> io::Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(report)
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
        return writeln!(out, "{rendered}");
    }

    for line in &report.transcript {
        writeln!(out, "[{:>7.2}s] {}", line.at_ms as f64 / 1000.0, line.text)?;
    }
    writeln!(
        out,
        "scenes played: {}, actions skipped: {}",
        report.scenes_played, report.actions_skipped
    )?;
    for failure in &report.supply_failures {
        writeln!(out, "failed: {failure}")?;
    }
    if let Some(capture) = &report.capture {
        writeln!(
            out,
            "capture: {} frames over {} scenes, {} ms, sha256 {}",
            capture.frames, capture.scenes, capture.span_ms, capture.digest
        )?;
    }
    Ok(())
}
