use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::canvas::{ActorSprite, Canvas};
use crate::phrasing::SpeechPhrasing;
use crate::script::{ActionKind, ActorId, Facing};
use crate::sprites::{Clip, SpriteAnimationSet};
use crate::timing::FrameTime;

pub const FRAME_DURATION_SECONDS: f32 = 0.1;
pub const SNAP_THRESHOLD: f32 = 35.0;
pub const WALK_SPEED: f32 = 120.0;
pub const SPEECH_DURATION: Duration = Duration::from_millis(3000);
pub const ONE_SHOT_DURATION: Duration = Duration::from_millis(2000);
pub const LEAVE_LEFT_TARGET: f32 = -100.0;
pub const LEAVE_RIGHT_MARGIN: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorTuning {
    pub frame_duration_seconds: f32,
    pub snap_threshold: f32,
    pub walk_speed: f32,
    pub speech_duration: Duration,
    pub attack_duration: Duration,
    pub death_duration: Duration,
    pub leave_left_target: f32,
    pub leave_right_margin: f32,
}

impl Default for ActorTuning {
    fn default() -> Self {
        Self {
            frame_duration_seconds: FRAME_DURATION_SECONDS,
            snap_threshold: SNAP_THRESHOLD,
            walk_speed: WALK_SPEED,
            speech_duration: SPEECH_DURATION,
            attack_duration: ONE_SHOT_DURATION,
            death_duration: ONE_SHOT_DURATION,
            leave_left_target: LEAVE_LEFT_TARGET,
            leave_right_margin: LEAVE_RIGHT_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveSide {
    Left,
    Right,
}

/// One scripted instruction with its parameter already interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Move { target: f32 },
    Leave { side: LeaveSide },
    Speak { text: String },
    Attack,
    Death,
}

impl ActionRequest {
    /// Interprets a raw parameter. Only `move` can fail; `leave` treats
    /// anything but "left" as the right edge.
    pub fn parse(kind: ActionKind, parameter: &str) -> Result<Self, ActionError> {
        match kind {
            ActionKind::Move => {
                let trimmed = parameter.trim();
                match trimmed.parse::<f32>() {
                    Ok(target) if target.is_finite() => Ok(Self::Move { target }),
                    _ => Err(ActionError::InvalidTarget {
                        parameter: parameter.to_string(),
                    }),
                }
            }
            ActionKind::Leave => {
                let side = if parameter.trim().eq_ignore_ascii_case("left") {
                    LeaveSide::Left
                } else {
                    LeaveSide::Right
                };
                Ok(Self::Leave { side })
            }
            ActionKind::Speak => Ok(Self::Speak {
                text: parameter.to_string(),
            }),
            ActionKind::Attack => Ok(Self::Attack),
            ActionKind::Death => Ok(Self::Death),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Move { .. } => ActionKind::Move,
            Self::Leave { .. } => ActionKind::Leave,
            Self::Speak { .. } => ActionKind::Speak,
            Self::Attack => ActionKind::Attack,
            Self::Death => ActionKind::Death,
        }
    }
}

/// Identifies one accepted action. Unique per actor within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionTicket {
    pub actor: ActorId,
    pub serial: u32,
}

impl fmt::Display for ActionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.actor.as_token(), self.serial)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("move target '{parameter}' is not a number or a declared actor")]
    InvalidTarget { parameter: String },
    #[error("{actor} is already speaking")]
    AlreadySpeaking { actor: ActorId },
    #[error("{actor} is still busy with a {in_flight} action")]
    Busy {
        actor: ActorId,
        in_flight: ActionKind,
    },
    #[error("{actor} is dead and cannot act")]
    Dead { actor: ActorId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorEvent {
    /// Caption to show for `actor`; empty text hides it.
    SpeechChanged { actor: ActorId, text: String },
    Completed(ActionTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Pending,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
enum Work {
    Walk { target: f32 },
    Speak { caption: String, until: Option<Duration> },
    OneShot { clip: Clip, duration: Duration, until: Option<Duration> },
}

/// The action an actor is carrying out, or last carried out.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSlot {
    ticket: ActionTicket,
    kind: ActionKind,
    phase: ActionPhase,
    work: Work,
}

impl ActionSlot {
    pub fn ticket(&self) -> ActionTicket {
        self.ticket
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    fn is_open(&self) -> bool {
        self.phase != ActionPhase::Complete
    }
}

pub struct Actor {
    id: ActorId,
    sprites: SpriteAnimationSet,
    tuning: ActorTuning,
    surface_width: f32,
    position: f32,
    facing: Facing,
    clip: Clip,
    frame_index: u32,
    frame_timer: f32,
    move_target: Option<f32>,
    speech: Option<String>,
    dead: bool,
    slot: Option<ActionSlot>,
    next_serial: u32,
}

impl Actor {
    pub fn new(
        id: ActorId,
        position: f32,
        facing: Facing,
        sprites: SpriteAnimationSet,
        tuning: ActorTuning,
        surface_width: f32,
    ) -> Self {
        Self {
            id,
            sprites,
            tuning,
            surface_width,
            position,
            facing,
            clip: Clip::Idle,
            frame_index: 0,
            frame_timer: 0.0,
            move_target: None,
            speech: None,
            dead: false,
            slot: None,
            next_serial: 0,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn clip(&self) -> Clip {
        self.clip
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn move_target(&self) -> Option<f32> {
        self.move_target
    }

    pub fn speech(&self) -> Option<&str> {
        self.speech.as_deref()
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn current_action(&self) -> Option<&ActionSlot> {
        self.slot.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.as_ref().is_some_and(ActionSlot::is_open)
    }

    pub fn sprites(&self) -> &SpriteAnimationSet {
        &self.sprites
    }

    pub fn poll_sprites(&mut self) {
        self.sprites.poll();
    }

    /// Switches clips. Does nothing before the sprites are ready, for absent
    /// clips, for the clip already playing, and for anything but death once
    /// the actor has died.
    pub fn set_clip(&mut self, clip: Clip) {
        if clip == self.clip {
            return;
        }
        if self.dead && clip != Clip::Death {
            return;
        }
        if !self.sprites.is_ready() || self.sprites.sheet(clip).is_none() {
            return;
        }
        self.clip = clip;
        self.frame_index = 0;
        self.frame_timer = 0.0;
    }

    /// Accepts one action. It starts on the next [`Actor::poll_timers`] or
    /// [`Actor::tick`]; completion is always reported later as an event.
    pub fn handle_action(
        &mut self,
        request: ActionRequest,
        phrasing: &mut dyn SpeechPhrasing,
    ) -> Result<ActionTicket, ActionError> {
        if self.dead {
            return Err(ActionError::Dead { actor: self.id });
        }
        if matches!(request, ActionRequest::Speak { .. }) && self.speech.is_some() {
            return Err(ActionError::AlreadySpeaking { actor: self.id });
        }
        if let Some(slot) = self.slot.as_ref().filter(|slot| slot.is_open()) {
            return Err(if slot.kind == ActionKind::Speak {
                ActionError::AlreadySpeaking { actor: self.id }
            } else {
                ActionError::Busy {
                    actor: self.id,
                    in_flight: slot.kind,
                }
            });
        }

        let kind = request.kind();
        let work = match request {
            ActionRequest::Move { target } => Work::Walk { target },
            ActionRequest::Leave { side } => Work::Walk {
                target: self.leave_target(side),
            },
            ActionRequest::Speak { text } => Work::Speak {
                caption: phrasing.compose(&text, self.id.display_name()),
                until: None,
            },
            ActionRequest::Attack => Work::OneShot {
                clip: Clip::Attack,
                duration: self.tuning.attack_duration,
                until: None,
            },
            ActionRequest::Death => Work::OneShot {
                clip: Clip::Death,
                duration: self.tuning.death_duration,
                until: None,
            },
        };

        let ticket = ActionTicket {
            actor: self.id,
            serial: self.next_serial,
        };
        self.next_serial = self.next_serial.wrapping_add(1);
        self.slot = Some(ActionSlot {
            ticket,
            kind,
            phase: ActionPhase::Pending,
            work,
        });
        debug!(
            actor = self.id.as_token(),
            ticket = %ticket,
            kind = kind.as_token(),
            "action_accepted"
        );
        Ok(ticket)
    }

    pub fn leave_target(&self, side: LeaveSide) -> f32 {
        match side {
            LeaveSide::Left => self.tuning.leave_left_target,
            LeaveSide::Right => self.surface_width + self.tuning.leave_right_margin,
        }
    }

    /// Starts a pending action and fires any timed completion that is due.
    /// Safe to call without a frame, so deferred completions still land after
    /// playback stops.
    pub fn poll_timers(&mut self, now: Duration, events: &mut Vec<ActorEvent>) {
        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        if slot.phase == ActionPhase::Pending {
            slot.phase = ActionPhase::InProgress;
            let mut start_clip = None;
            match &mut slot.work {
                Work::Walk { target } => self.move_target = Some(*target),
                Work::Speak { caption, until } => {
                    *until = Some(now.saturating_add(self.tuning.speech_duration));
                    self.speech = Some(caption.clone());
                    events.push(ActorEvent::SpeechChanged {
                        actor: self.id,
                        text: caption.clone(),
                    });
                }
                Work::OneShot {
                    clip,
                    duration,
                    until,
                } => {
                    *until = Some(now.saturating_add(*duration));
                    start_clip = Some(*clip);
                }
            }
            if let Some(clip) = start_clip {
                if clip == Clip::Death {
                    self.set_clip(clip);
                    self.dead = true;
                } else {
                    self.set_clip(clip);
                }
            }
        }

        let due = match &self.slot {
            Some(ActionSlot {
                phase: ActionPhase::InProgress,
                work:
                    Work::Speak {
                        until: Some(until), ..
                    }
                    | Work::OneShot {
                        until: Some(until), ..
                    },
                ..
            }) => now >= *until,
            _ => false,
        };
        if due {
            self.finish_timed(events);
        }
    }

    fn finish_timed(&mut self, events: &mut Vec<ActorEvent>) {
        let Some(kind) = self.slot.as_ref().map(|slot| slot.kind) else {
            return;
        };
        match kind {
            ActionKind::Speak => {
                self.speech = None;
                events.push(ActorEvent::SpeechChanged {
                    actor: self.id,
                    text: String::new(),
                });
            }
            ActionKind::Attack => self.set_clip(Clip::Idle),
            _ => {}
        }
        self.complete_slot(events);
    }

    fn complete_slot(&mut self, events: &mut Vec<ActorEvent>) {
        if let Some(slot) = self.slot.as_mut().filter(|slot| slot.is_open()) {
            slot.phase = ActionPhase::Complete;
            debug!(actor = self.id.as_token(), ticket = %slot.ticket, "action_completed");
            events.push(ActorEvent::Completed(slot.ticket));
        }
    }

    /// Advances animation and movement by one frame, then draws the current
    /// frame.
    pub fn tick(
        &mut self,
        frame: FrameTime,
        canvas: &mut dyn Canvas,
        events: &mut Vec<ActorEvent>,
    ) {
        self.poll_timers(frame.now, events);
        self.advance_frame(frame.elapsed_seconds);

        if self.dead {
            self.set_clip(Clip::Death);
        }

        if let Some(target) = self.move_target {
            let remaining = target - self.position;
            if remaining != 0.0 {
                self.facing = Facing::toward(self.position, target);
            }
            let step =
                (self.tuning.walk_speed * frame.elapsed_seconds.max(0.0)).min(remaining.abs());
            self.position += step * remaining.signum();
            self.set_clip(Clip::Walk);

            if (target - self.position).abs() <= self.tuning.snap_threshold {
                self.move_target = None;
                self.set_clip(Clip::Idle);
                self.complete_slot(events);
            }
        }

        self.render(canvas);
    }

    fn advance_frame(&mut self, elapsed_seconds: f32) {
        self.frame_timer += elapsed_seconds.max(0.0);
        if self.frame_timer < self.tuning.frame_duration_seconds {
            return;
        }
        self.frame_timer = 0.0;
        let Some(frame_count) = self.sprites.frame_count(self.clip) else {
            return;
        };
        let next = self.frame_index.saturating_add(1);
        self.frame_index = if next < frame_count {
            next
        } else if self.clip.is_one_shot() {
            frame_count.saturating_sub(1)
        } else {
            0
        };
    }

    fn render(&self, canvas: &mut dyn Canvas) {
        canvas.draw_actor(&ActorSprite {
            actor: self.id,
            clip: self.clip,
            frame_index: self.frame_index,
            position: self.position,
            facing: self.facing,
            sheet: self.sprites.sheet(self.clip),
        });
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("facing", &self.facing)
            .field("clip", &self.clip)
            .field("frame_index", &self.frame_index)
            .field("move_target", &self.move_target)
            .field("speech", &self.speech)
            .field("dead", &self.dead)
            .field("slot", &self.slot)
            .finish()
    }
}
