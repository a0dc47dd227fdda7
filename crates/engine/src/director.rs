use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actor::{
    ActionError, ActionRequest, ActionTicket, Actor, ActorEvent, ActorTuning,
};
use crate::assets::{AssetKey, AssetSource, AudioTrack, LoadSlot, LoadedImage};
use crate::canvas::Canvas;
use crate::phrasing::{RandomPhrasing, SpeechPhrasing};
use crate::script::{ActionKind, ActorId, Scene, SceneAction};
use crate::sprites::SpriteAnimationSet;
use crate::timing::FrameTime;

pub const DEFAULT_SURFACE_WIDTH: u32 = 800;
pub const DEFAULT_SURFACE_HEIGHT: u32 = 600;
pub const SETTLE_DELAY: Duration = Duration::from_millis(2000);
pub const PACING_AFTER_ATTACK: Duration = Duration::from_millis(5000);
pub const PACING_DEFAULT: Duration = Duration::from_millis(500);

/// Identity of one director. Deferred signals carry it so the caller can
/// drop anything coming from a scene that is no longer current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneToken(u64);

impl fmt::Display for SceneToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// Hands out tokens and remembers which one is live.
#[derive(Debug, Default)]
pub struct SceneSlot {
    issued: u64,
    current: Option<SceneToken>,
}

impl SceneSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh token and makes it current, superseding any other.
    pub fn issue(&mut self) -> SceneToken {
        self.issued = self.issued.wrapping_add(1);
        let token = SceneToken(self.issued);
        self.current = Some(token);
        token
    }

    pub fn current(&self) -> Option<SceneToken> {
        self.current
    }

    pub fn is_current(&self, token: SceneToken) -> bool {
        self.current == Some(token)
    }

    /// Returns false when `token` was not the live one.
    pub fn retire(&mut self, token: SceneToken) -> bool {
        if self.is_current(token) {
            self.current = None;
            true
        } else {
            false
        }
    }
}

/// Signals a director raises toward its host.
pub trait SceneObserver {
    fn speech_changed(&mut self, token: SceneToken, actor: ActorId, text: &str);
    fn first_frame_reached(&mut self, token: SceneToken);
    fn scene_finished(&mut self, token: SceneToken);

    fn action_started(
        &mut self,
        _token: SceneToken,
        _index: usize,
        _actor: ActorId,
        _kind: ActionKind,
    ) {
    }

    fn action_completed(&mut self, _token: SceneToken, _index: usize) {}

    fn action_skipped(&mut self, _token: SceneToken, _index: usize, _reason: &DispatchError) {}

    fn soundtrack_ready(&mut self, _token: SceneToken, _track: &AudioTrack) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    SpeechChanged {
        token: SceneToken,
        actor: ActorId,
        text: String,
    },
    FirstFrameReached {
        token: SceneToken,
    },
    ActionStarted {
        token: SceneToken,
        index: usize,
        actor: ActorId,
        kind: ActionKind,
    },
    ActionCompleted {
        token: SceneToken,
        index: usize,
    },
    ActionSkipped {
        token: SceneToken,
        index: usize,
        reason: DispatchError,
    },
    SoundtrackReady {
        token: SceneToken,
        track: AudioTrack,
    },
    SceneFinished {
        token: SceneToken,
    },
}

impl SceneEvent {
    pub fn token(&self) -> SceneToken {
        match self {
            Self::SpeechChanged { token, .. }
            | Self::FirstFrameReached { token }
            | Self::ActionStarted { token, .. }
            | Self::ActionCompleted { token, .. }
            | Self::ActionSkipped { token, .. }
            | Self::SoundtrackReady { token, .. }
            | Self::SceneFinished { token } => *token,
        }
    }
}

/// Observer that queues every signal for the owner to drain after a frame.
/// Clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct SceneEventQueue {
    events: Rc<RefCell<VecDeque<SceneEvent>>>,
}

impl SceneEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<SceneEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    fn push(&self, event: SceneEvent) {
        self.events.borrow_mut().push_back(event);
    }
}

impl SceneObserver for SceneEventQueue {
    fn speech_changed(&mut self, token: SceneToken, actor: ActorId, text: &str) {
        self.push(SceneEvent::SpeechChanged {
            token,
            actor,
            text: text.to_string(),
        });
    }

    fn first_frame_reached(&mut self, token: SceneToken) {
        self.push(SceneEvent::FirstFrameReached { token });
    }

    fn scene_finished(&mut self, token: SceneToken) {
        self.push(SceneEvent::SceneFinished { token });
    }

    fn action_started(
        &mut self,
        token: SceneToken,
        index: usize,
        actor: ActorId,
        kind: ActionKind,
    ) {
        self.push(SceneEvent::ActionStarted {
            token,
            index,
            actor,
            kind,
        });
    }

    fn action_completed(&mut self, token: SceneToken, index: usize) {
        self.push(SceneEvent::ActionCompleted { token, index });
    }

    fn action_skipped(&mut self, token: SceneToken, index: usize, reason: &DispatchError) {
        self.push(SceneEvent::ActionSkipped {
            token,
            index,
            reason: reason.clone(),
        });
    }

    fn soundtrack_ready(&mut self, token: SceneToken, track: &AudioTrack) {
        self.push(SceneEvent::SoundtrackReady {
            token,
            track: track.clone(),
        });
    }
}

/// Pause inserted after each completed action before the next may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub after_attack: Duration,
    pub default: Duration,
}

impl PacingPolicy {
    pub fn none() -> Self {
        Self {
            after_attack: Duration::ZERO,
            default: Duration::ZERO,
        }
    }

    pub fn delay_after(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Attack => self.after_attack,
            _ => self.default,
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            after_attack: PACING_AFTER_ATTACK,
            default: PACING_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectorConfig {
    pub surface_width: u32,
    pub surface_height: u32,
    pub settle_delay: Duration,
    pub pacing: PacingPolicy,
    pub actor_tuning: ActorTuning,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            surface_width: DEFAULT_SURFACE_WIDTH,
            surface_height: DEFAULT_SURFACE_HEIGHT,
            settle_delay: SETTLE_DELAY,
            pacing: PacingPolicy::default(),
            actor_tuning: ActorTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{actor} is not part of this scene")]
pub struct ActorLookupError {
    pub actor: ActorId,
}

/// Why an action at the cursor was skipped instead of dispatched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Lookup(#[from] ActorLookupError),
    #[error(transparent)]
    Rejected(#[from] ActionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Waiting to dispatch the action at the cursor, not before the given
    /// time when pacing applies.
    Idle { not_before: Option<Duration> },
    InFlight {
        index: usize,
        ticket: ActionTicket,
        kind: ActionKind,
    },
    Settling { until: Duration },
    Finished,
}

/// Runs one scene: owns the cast and the backdrop and keeps exactly one
/// action in flight at a time. Built fresh for every scene.
pub struct SceneDirector {
    token: SceneToken,
    scene: Scene,
    config: DirectorConfig,
    order: Vec<ActorId>,
    actors: HashMap<ActorId, Actor>,
    backdrop: LoadSlot<LoadedImage>,
    soundtrack: LoadSlot<AudioTrack>,
    soundtrack_announced: bool,
    cursor: usize,
    state: CursorState,
    first_frame_signalled: bool,
    phrasing: Box<dyn SpeechPhrasing>,
    observer: Box<dyn SceneObserver>,
    actor_events: Vec<ActorEvent>,
}

impl SceneDirector {
    pub fn new(
        token: SceneToken,
        scene: Scene,
        config: DirectorConfig,
        assets: &mut dyn AssetSource,
        observer: Box<dyn SceneObserver>,
    ) -> Self {
        let surface_width = config.surface_width as f32;
        let mut order = Vec::with_capacity(scene.actors.len());
        let mut actors = HashMap::with_capacity(scene.actors.len());
        for declared in &scene.actors {
            if actors.contains_key(&declared.actor) {
                warn!(
                    token = %token,
                    actor = declared.actor.as_token(),
                    "duplicate_actor_ignored"
                );
                continue;
            }
            let sprites = SpriteAnimationSet::request(declared.actor, assets);
            let actor = Actor::new(
                declared.actor,
                surface_width * declared.start_position,
                declared.facing,
                sprites,
                config.actor_tuning,
                surface_width,
            );
            order.push(declared.actor);
            actors.insert(declared.actor, actor);
        }

        let backdrop = assets.request_image(AssetKey::Backdrop(scene.backdrop));
        let soundtrack = assets.request_audio(scene.music);
        info!(
            token = %token,
            backdrop = scene.backdrop.as_token(),
            music = scene.music.as_token(),
            actor_count = order.len(),
            action_count = scene.action_count(),
            "scene_director_created"
        );

        Self {
            token,
            scene,
            config,
            order,
            actors,
            backdrop,
            soundtrack,
            soundtrack_announced: false,
            cursor: 0,
            state: CursorState::Idle { not_before: None },
            first_frame_signalled: false,
            phrasing: Box::new(RandomPhrasing::new()),
            observer,
            actor_events: Vec::new(),
        }
    }

    pub fn with_phrasing(mut self, phrasing: Box<dyn SpeechPhrasing>) -> Self {
        self.phrasing = phrasing;
        self
    }

    pub fn token(&self) -> SceneToken {
        self.token
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == CursorState::Finished
    }

    pub fn backdrop_ready(&self) -> bool {
        self.backdrop.get().is_some()
    }

    pub fn actor(&self, actor: ActorId) -> Result<&Actor, ActorLookupError> {
        self.actors.get(&actor).ok_or(ActorLookupError { actor })
    }

    /// Actors in declaration order.
    pub fn actors(&self) -> impl Iterator<Item = &Actor> + '_ {
        self.order.iter().filter_map(|id| self.actors.get(id))
    }

    /// Caption currently on screen, if any actor is speaking.
    pub fn caption(&self) -> Option<&str> {
        self.actors().find_map(Actor::speech)
    }

    /// One frame: backdrop, then every actor in declaration order, then
    /// timers and dispatch.
    pub fn tick(&mut self, frame: FrameTime, canvas: &mut dyn Canvas) {
        let now = frame.now;
        canvas.clear();
        if let Some(image) = self.backdrop.poll() {
            canvas.draw_backdrop(image);
        }
        self.poll_soundtrack();

        for id in &self.order {
            if let Some(actor) = self.actors.get_mut(id) {
                actor.poll_sprites();
                actor.tick(frame, canvas, &mut self.actor_events);
            }
        }
        self.process_actor_events(now);

        self.poll_timers(now);

        if let CursorState::Idle { not_before } = self.state {
            if not_before.map_or(true, |at| now >= at) {
                self.dispatch(now);
            }
        }

        if !self.first_frame_signalled {
            self.first_frame_signalled = true;
            debug!(token = %self.token, "first_frame_reached");
            self.observer.first_frame_reached(self.token);
        }
    }

    /// Fires due action timers and the settle delay. Keeps working after the
    /// playback loop has stopped; callers check the token.
    pub fn poll_timers(&mut self, now: Duration) {
        for id in &self.order {
            if let Some(actor) = self.actors.get_mut(id) {
                actor.poll_timers(now, &mut self.actor_events);
            }
        }
        self.process_actor_events(now);

        if let CursorState::Settling { until } = self.state {
            if now >= until {
                self.state = CursorState::Finished;
                info!(token = %self.token, actions = self.cursor, "scene_finished");
                self.observer.scene_finished(self.token);
            }
        }
    }

    fn poll_soundtrack(&mut self) {
        if self.soundtrack_announced {
            return;
        }
        if let Some(track) = self.soundtrack.poll() {
            self.soundtrack_announced = true;
            debug!(token = %self.token, music = track.music.as_token(), "soundtrack_ready");
            self.observer.soundtrack_ready(self.token, track);
        } else if self.soundtrack.is_settled() {
            self.soundtrack_announced = true;
        }
    }

    fn process_actor_events(&mut self, now: Duration) {
        if self.actor_events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.actor_events);
        for event in events {
            match event {
                ActorEvent::SpeechChanged { actor, text } => {
                    self.observer.speech_changed(self.token, actor, &text);
                }
                ActorEvent::Completed(ticket) => match self.state {
                    CursorState::InFlight {
                        index,
                        ticket: expected,
                        kind,
                    } if expected == ticket => {
                        debug!(token = %self.token, index, ticket = %ticket, "action_completed");
                        self.observer.action_completed(self.token, index);
                        self.advance(now, self.config.pacing.delay_after(kind));
                    }
                    _ => {
                        warn!(
                            token = %self.token,
                            ticket = %ticket,
                            "unexpected_action_completion"
                        );
                    }
                },
            }
        }
    }

    fn advance(&mut self, now: Duration, pause: Duration) {
        self.cursor += 1;
        if self.cursor >= self.scene.actions.len() {
            self.begin_settling(now);
        } else {
            self.state = CursorState::Idle {
                not_before: Some(now.saturating_add(pause)),
            };
        }
    }

    fn begin_settling(&mut self, now: Duration) {
        let until = now.saturating_add(self.config.settle_delay);
        self.state = CursorState::Settling { until };
        info!(
            token = %self.token,
            actions = self.scene.actions.len(),
            settle_ms = self.config.settle_delay.as_millis() as u64,
            "scene_actions_done"
        );
    }

    fn dispatch(&mut self, now: Duration) {
        let index = self.cursor;
        let Some(action) = self.scene.actions.get(index).cloned() else {
            self.begin_settling(now);
            return;
        };

        let dispatched = self.resolve(&action).and_then(|request| {
            let actor = self
                .actors
                .get_mut(&action.actor)
                .ok_or(ActorLookupError {
                    actor: action.actor,
                })?;
            Ok(actor.handle_action(request, self.phrasing.as_mut())?)
        });

        match dispatched {
            Ok(ticket) => {
                self.state = CursorState::InFlight {
                    index,
                    ticket,
                    kind: action.kind,
                };
                info!(
                    token = %self.token,
                    index,
                    actor = action.actor.as_token(),
                    kind = action.kind.as_token(),
                    parameter = action.parameter.as_str(),
                    "action_dispatched"
                );
                self.observer
                    .action_started(self.token, index, action.actor, action.kind);
                if let Some(actor) = self.actors.get_mut(&action.actor) {
                    actor.poll_timers(now, &mut self.actor_events);
                }
                self.process_actor_events(now);
            }
            Err(reason) => {
                warn!(
                    token = %self.token,
                    index,
                    actor = action.actor.as_token(),
                    kind = action.kind.as_token(),
                    error = %reason,
                    "action_skipped"
                );
                self.observer.action_skipped(self.token, index, &reason);
                self.advance(now, self.config.pacing.default);
            }
        }
    }

    fn resolve(&self, action: &SceneAction) -> Result<ActionRequest, DispatchError> {
        self.actor(action.actor)?;
        if action.kind != ActionKind::Move {
            return Ok(ActionRequest::parse(action.kind, &action.parameter)?);
        }
        // A move toward another actor aims at where that actor stands now.
        if let Some(target_actor) = ActorId::from_token(&action.parameter) {
            let target = self.actor(target_actor)?.position();
            return Ok(ActionRequest::Move { target });
        }
        Ok(ActionRequest::parse(ActionKind::Move, &action.parameter)?)
    }
}

impl fmt::Debug for SceneDirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneDirector")
            .field("token", &self.token)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .field("actors", &self.order)
            .finish()
    }
}
