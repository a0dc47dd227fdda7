mod producer;
mod validate;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use producer::{
    create_scene_with_retry, AttemptFailure, ProducerError, SceneCreationError, SceneProducer,
    SceneRequest, SCENE_CREATION_ATTEMPTS,
};
pub use validate::{parse_scene_json, validate_scene, SceneValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorId {
    Archer,
    Knight,
    Orc,
    Preist,
    Skeleton,
    Slime,
    Soldier,
    Swordsman,
    Werewolf,
    Wizard,
}

impl ActorId {
    pub const ALL: [ActorId; 10] = [
        Self::Archer,
        Self::Knight,
        Self::Orc,
        Self::Preist,
        Self::Skeleton,
        Self::Slime,
        Self::Soldier,
        Self::Swordsman,
        Self::Werewolf,
        Self::Wizard,
    ];

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Archer => "archer",
            Self::Knight => "knight",
            Self::Orc => "orc",
            Self::Preist => "preist",
            Self::Skeleton => "skeleton",
            Self::Slime => "slime",
            Self::Soldier => "soldier",
            Self::Swordsman => "swordsman",
            Self::Werewolf => "werewolf",
            Self::Wizard => "wizard",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_token().eq_ignore_ascii_case(token))
    }

    /// Name shown to the audience when the actor speaks.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Archer => "Archer",
            Self::Knight => "Knight",
            Self::Orc => "Orc",
            Self::Preist => "Priest",
            Self::Skeleton => "Skeleton",
            Self::Slime => "Slime",
            Self::Soldier => "Soldier",
            Self::Swordsman => "Swordsman",
            Self::Werewolf => "Werewolf",
            Self::Wizard => "Wizard",
        }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackdropId {
    Lake,
    Castle,
    Cave,
    Village,
    Village2,
    Desert,
}

impl BackdropId {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Lake => "lake",
            Self::Castle => "castle",
            Self::Cave => "cave",
            Self::Village => "village",
            Self::Village2 => "village2",
            Self::Desert => "desert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicId {
    Calm1,
    Battle1,
    Battle2,
    Calm2,
}

impl MusicId {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Calm1 => "calm1",
            Self::Battle1 => "battle1",
            Self::Battle2 => "battle2",
            Self::Calm2 => "calm2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
    Leave,
    Speak,
    #[serde(alias = "attack01")]
    Attack,
    Death,
}

impl ActionKind {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Leave => "leave",
            Self::Speak => "speak",
            Self::Attack => "attack",
            Self::Death => "death",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Left,
    #[default]
    Right,
}

impl Facing {
    pub fn toward(from: f32, to: f32) -> Self {
        if to < from {
            Self::Left
        } else {
            Self::Right
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneActor {
    #[serde(rename = "character")]
    pub actor: ActorId,
    #[serde(rename = "position")]
    pub start_position: f32,
    #[serde(rename = "direction")]
    pub facing: Facing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAction {
    #[serde(rename = "character")]
    pub actor: ActorId,
    #[serde(rename = "actionType")]
    pub kind: ActionKind,
    #[serde(rename = "target")]
    pub parameter: String,
}

/// One validated unit of presentable content. Field names on the wire follow
/// the story producer's format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "characters")]
    pub actors: Vec<SceneActor>,
    #[serde(rename = "backdrop")]
    pub backdrop: BackdropId,
    #[serde(rename = "music")]
    pub music: MusicId,
    pub actions: Vec<SceneAction>,
}

impl Scene {
    pub fn declared_actor(&self, actor: ActorId) -> Option<&SceneActor> {
        self.actors.iter().find(|declared| declared.actor == actor)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}
