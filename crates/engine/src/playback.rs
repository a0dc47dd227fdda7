use std::time::Duration;

use tracing::{debug, info};

use crate::canvas::Canvas;
use crate::director::SceneDirector;
use crate::timing::{Clock, FrameTime};

/// Handle for one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

impl FrameRequest {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// The host's per-frame primitive: ask for one callback, or withdraw it.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Whatever the loop drives once per frame.
pub trait FrameTarget {
    fn tick(&mut self, frame: FrameTime, canvas: &mut dyn Canvas);
}

impl FrameTarget for SceneDirector {
    fn tick(&mut self, frame: FrameTime, canvas: &mut dyn Canvas) {
        SceneDirector::tick(self, frame, canvas);
    }
}

/// Scheduler for hosts that deliver frames themselves: at most one request is
/// outstanding and the host takes it when it is ready to run a frame.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    issued: u64,
    outstanding: Option<FrameRequest>,
    cancelled: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_due(&mut self) -> Option<FrameRequest> {
        self.outstanding.take()
    }

    pub fn outstanding(&self) -> Option<FrameRequest> {
        self.outstanding
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        self.issued = self.issued.wrapping_add(1);
        let request = FrameRequest(self.issued);
        self.outstanding = Some(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.outstanding == Some(request) {
            self.outstanding = None;
            self.cancelled += 1;
        }
    }
}

/// Calls its target once per delivered frame with the measured time since the
/// previous frame. Stopping cancels the next frame only; timers already
/// running inside the target are untouched.
#[derive(Debug)]
pub struct PlaybackLoop<C: Clock> {
    clock: C,
    max_frame_delta: Option<Duration>,
    last_frame_at: Option<Duration>,
    pending: Option<FrameRequest>,
    frames: u64,
}

impl<C: Clock> PlaybackLoop<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            max_frame_delta: None,
            last_frame_at: None,
            pending: None,
            frames: 0,
        }
    }

    /// Caps a single frame's delta, e.g. after the host was suspended.
    pub fn with_max_frame_delta(mut self, max_frame_delta: Option<Duration>) -> Self {
        self.max_frame_delta = max_frame_delta.filter(|value| !value.is_zero());
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.is_running() {
            debug!("playback_already_running");
            return;
        }
        let now = self.clock.now();
        self.last_frame_at = Some(now);
        self.pending = Some(scheduler.request_frame());
        info!(baseline_ms = now.as_millis() as u64, "playback_started");
    }

    /// Safe to call repeatedly or before [`PlaybackLoop::start`].
    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        let Some(request) = self.pending.take() else {
            return;
        };
        scheduler.cancel_frame(request);
        self.last_frame_at = None;
        info!(frames = self.frames, "playback_stopped");
    }

    /// Runs one frame if `request` is the one this loop is waiting for.
    /// Returns the frame time handed to the target.
    pub fn on_frame(
        &mut self,
        request: FrameRequest,
        scheduler: &mut dyn FrameScheduler,
        target: &mut dyn FrameTarget,
        canvas: &mut dyn Canvas,
    ) -> Option<FrameTime> {
        if self.pending != Some(request) {
            debug!(request = request.id(), "stale_frame_ignored");
            return None;
        }

        let now = self.clock.now();
        let last = self.last_frame_at.unwrap_or(now);
        let raw_elapsed = now.saturating_sub(last);
        let elapsed = match self.max_frame_delta {
            Some(max) => raw_elapsed.min(max),
            None => raw_elapsed,
        };
        self.last_frame_at = Some(now);
        self.pending = Some(scheduler.request_frame());
        self.frames = self.frames.saturating_add(1);

        let frame = FrameTime::new(elapsed, now);
        target.tick(frame, canvas);
        Some(frame)
    }
}
