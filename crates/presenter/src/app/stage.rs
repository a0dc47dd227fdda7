use std::time::Duration;

use scene_engine::{
    ActorId, AssetSource, Canvas, CaptureSession, CaptureSummary, Clock, DirectorConfig,
    FrameBuffer, FrameHost, FrameRequest, FrameScheduler, HostFlow, MusicId, PlaybackLoop,
    RandomPhrasing, SceneDirector, SceneEvent, SceneEventQueue, SceneSlot, SilentPlayer,
    SoundtrackPlayer,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::supply::{SceneSupply, SuppliedScene};

const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SpeechLine {
    pub(crate) scene: String,
    pub(crate) at_ms: u64,
    pub(crate) actor: ActorId,
    pub(crate) text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct CaptureReport {
    pub(crate) frames: usize,
    pub(crate) scenes: usize,
    pub(crate) span_ms: u64,
    pub(crate) digest: String,
}

impl From<CaptureSummary> for CaptureReport {
    fn from(summary: CaptureSummary) -> Self {
        Self {
            frames: summary.frames,
            scenes: summary.scenes,
            span_ms: summary.span.as_millis() as u64,
            digest: summary.digest,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct StageReport {
    pub(crate) scenes_played: usize,
    pub(crate) actions_skipped: usize,
    pub(crate) supply_failures: Vec<String>,
    pub(crate) soundtracks: Vec<MusicId>,
    pub(crate) transcript: Vec<SpeechLine>,
    pub(crate) capture: Option<CaptureReport>,
}

struct ActiveScene<C: Clock> {
    label: String,
    director: SceneDirector,
    playback: PlaybackLoop<C>,
}

/// Sequences scenes one after another. Only the director holding the current
/// token may affect the presentation; signals from retired scenes are dropped.
pub(crate) struct Stage<C: Clock + Clone> {
    clock: C,
    assets: Box<dyn AssetSource>,
    supply: Box<dyn SceneSupply>,
    config: DirectorConfig,
    phrasing_seed: Option<u64>,
    max_frame_delta: Option<Duration>,
    slot: SceneSlot,
    events: SceneEventQueue,
    current: Option<ActiveScene<C>>,
    capture: CaptureSession,
    soundtrack: Box<dyn SoundtrackPlayer>,
    playing: Option<MusicId>,
    scenes_loaded: u64,
    report: StageReport,
    finished: bool,
}

impl<C: Clock + Clone> Stage<C> {
    pub(crate) fn new(
        clock: C,
        assets: Box<dyn AssetSource>,
        supply: Box<dyn SceneSupply>,
        config: DirectorConfig,
    ) -> Self {
        Self {
            clock,
            assets,
            supply,
            config,
            phrasing_seed: None,
            max_frame_delta: Some(DEFAULT_MAX_FRAME_DELTA),
            slot: SceneSlot::new(),
            events: SceneEventQueue::new(),
            current: None,
            capture: CaptureSession::new(),
            soundtrack: Box::new(SilentPlayer),
            playing: None,
            scenes_loaded: 0,
            report: StageReport::default(),
            finished: false,
        }
    }

    /// Seeds speech phrasing so repeated runs caption identically.
    pub(crate) fn with_phrasing_seed(mut self, seed: Option<u64>) -> Self {
        self.phrasing_seed = seed;
        self
    }

    pub(crate) fn with_max_frame_delta(mut self, max_frame_delta: Option<Duration>) -> Self {
        self.max_frame_delta = max_frame_delta;
        self
    }

    pub(crate) fn with_soundtrack_player(mut self, player: Box<dyn SoundtrackPlayer>) -> Self {
        self.soundtrack = player;
        self
    }

    pub(crate) fn is_done(&self) -> bool {
        self.current.is_none()
    }

    pub(crate) fn current_director(&self) -> Option<&SceneDirector> {
        self.current.as_ref().map(|active| &active.director)
    }

    pub(crate) fn caption(&self) -> Option<&str> {
        self.current_director().and_then(SceneDirector::caption)
    }

    pub(crate) fn begin(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let Err(error) = self.capture.arm() {
            warn!(error = %error, "capture_arm_failed");
        }
        self.load_next(scheduler);
    }

    /// Runs the frame that came due, or only the timers when none did, then
    /// applies the signals the current scene raised.
    pub(crate) fn advance(
        &mut self,
        due: Option<FrameRequest>,
        scheduler: &mut dyn FrameScheduler,
        canvas: &mut FrameBuffer,
    ) -> HostFlow {
        let mut drawn = None;
        if let Some(active) = self.current.as_mut() {
            match due {
                Some(request) => {
                    if let Some(frame) =
                        active
                            .playback
                            .on_frame(request, scheduler, &mut active.director, canvas)
                    {
                        drawn = Some((active.director.token(), frame.now));
                    }
                }
                None => active.director.poll_timers(self.clock.now()),
            }
        }

        self.process_events(scheduler);

        if let Some((token, at)) = drawn {
            let (width, height) = canvas.size();
            self.capture
                .append_frame(token, at, width, height, canvas.rgba());
        }

        if self.is_done() {
            HostFlow::Exit
        } else {
            HostFlow::Continue
        }
    }

    /// Stops capture and hands back what happened. Later calls return the
    /// same report.
    pub(crate) fn finish(&mut self) -> StageReport {
        if !self.finished {
            self.finished = true;
            if let Some(active) = self.current.take() {
                self.slot.retire(active.director.token());
                info!(scene = active.label.as_str(), "scene_abandoned");
            }
            self.stop_soundtrack();
            self.report.capture = self.capture.stop().ok().map(CaptureReport::from);
        }
        self.report.clone()
    }

    fn load_next(&mut self, scheduler: &mut dyn FrameScheduler) {
        while let Some(supplied) = self.supply.next_scene() {
            match supplied {
                Ok(SuppliedScene { label, scene }) => {
                    let token = self.slot.issue();
                    let mut director = SceneDirector::new(
                        token,
                        scene,
                        self.config,
                        self.assets.as_mut(),
                        Box::new(self.events.clone()),
                    );
                    if let Some(seed) = self.phrasing_seed {
                        director = director.with_phrasing(Box::new(RandomPhrasing::seeded(
                            seed.wrapping_add(self.scenes_loaded),
                        )));
                    }
                    self.scenes_loaded += 1;

                    let mut playback = PlaybackLoop::new(self.clock.clone())
                        .with_max_frame_delta(self.max_frame_delta);
                    playback.start(scheduler);
                    info!(token = %token, scene = label.as_str(), "scene_loaded");
                    self.current = Some(ActiveScene {
                        label,
                        director,
                        playback,
                    });
                    return;
                }
                Err(error) => {
                    warn!(error = %error, "scene_supply_failed");
                    self.report.supply_failures.push(error.to_string());
                }
            }
        }

        self.current = None;
        info!(
            scenes_played = self.report.scenes_played,
            supply_failures = self.report.supply_failures.len(),
            "presentation_complete"
        );
    }

    fn stop_soundtrack(&mut self) {
        if let Some(music) = self.playing.take() {
            self.soundtrack.stop();
            debug!(music = music.as_token(), "soundtrack_released");
        }
    }

    fn process_events(&mut self, scheduler: &mut dyn FrameScheduler) {
        for event in self.events.drain() {
            let token = event.token();
            if !self.slot.is_current(token) {
                debug!(token = %token, "stale_scene_event_dropped");
                continue;
            }
            match event {
                SceneEvent::SpeechChanged { actor, text, .. } => {
                    if text.is_empty() {
                        continue;
                    }
                    let scene = self
                        .current
                        .as_ref()
                        .map(|active| active.label.clone())
                        .unwrap_or_default();
                    info!(actor = actor.as_token(), text = text.as_str(), "speech");
                    self.report.transcript.push(SpeechLine {
                        scene,
                        at_ms: self.clock.now().as_millis() as u64,
                        actor,
                        text,
                    });
                }
                SceneEvent::FirstFrameReached { token } => {
                    if let Err(error) = self.capture.resume(token) {
                        warn!(error = %error, "capture_resume_failed");
                    }
                }
                SceneEvent::ActionSkipped { .. } => {
                    self.report.actions_skipped += 1;
                }
                SceneEvent::SoundtrackReady { track, .. } => {
                    info!(
                        music = track.music.as_token(),
                        bytes = track.bytes.len(),
                        "soundtrack_ready"
                    );
                    self.report.soundtracks.push(track.music);
                    self.soundtrack.play(&track);
                    self.playing = Some(track.music);
                }
                SceneEvent::SceneFinished { token } => {
                    if let Some(mut active) = self.current.take() {
                        active.playback.stop(scheduler);
                        info!(
                            token = %token,
                            scene = active.label.as_str(),
                            frames = active.playback.frames(),
                            "scene_retired"
                        );
                    }
                    self.slot.retire(token);
                    self.stop_soundtrack();
                    if let Err(error) = self.capture.pause() {
                        warn!(error = %error, "capture_pause_failed");
                    }
                    self.report.scenes_played += 1;
                    self.load_next(scheduler);
                }
                SceneEvent::ActionStarted { .. } | SceneEvent::ActionCompleted { .. } => {}
            }
        }
    }
}

impl<C: Clock + Clone> FrameHost for Stage<C> {
    fn start(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.begin(scheduler);
    }

    fn frame(
        &mut self,
        due: Option<FrameRequest>,
        scheduler: &mut dyn FrameScheduler,
        canvas: &mut FrameBuffer,
    ) -> HostFlow {
        self.advance(due, scheduler, canvas)
    }

    fn title(&self) -> Option<String> {
        self.caption().map(ToString::to_string)
    }

    fn shutdown(&mut self) {
        let report = self.finish();
        info!(
            scenes_played = report.scenes_played,
            actions_skipped = report.actions_skipped,
            lines = report.transcript.len(),
            captured_frames = report.capture.as_ref().map_or(0, |capture| capture.frames),
            "stage_shutdown"
        );
    }
}
