use thiserror::Error;
use tracing::{info, warn};

use super::{parse_scene_json, Scene, SceneValidationError};

pub const SCENE_CREATION_ATTEMPTS: u32 = 3;

/// What the story producer is asked to depict for one node of the story graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneRequest {
    pub topic: String,
    pub follow_ups: Vec<String>,
    pub story_so_far: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProducerError {
    #[error("scene producer unavailable: {0}")]
    Unavailable(String),
    #[error("scene producer has no scene for topic '{0}'")]
    NoScene(String),
}

/// Opaque source of raw scene JSON, typically a generative service.
pub trait SceneProducer {
    fn produce_scene(&mut self, request: &SceneRequest) -> Result<String, ProducerError>;
}

impl<F> SceneProducer for F
where
    F: FnMut(&SceneRequest) -> Result<String, ProducerError>,
{
    fn produce_scene(&mut self, request: &SceneRequest) -> Result<String, ProducerError> {
        self(request)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptFailure {
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error(transparent)]
    Invalid(#[from] SceneValidationError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneCreationError {
    #[error("no attempts were allowed for topic '{topic}'")]
    NoAttempts { topic: String },
    #[error("failed to create a valid scene for '{topic}' after {attempts} attempts: {last}")]
    Exhausted {
        topic: String,
        attempts: u32,
        #[source]
        last: AttemptFailure,
    },
}

pub fn create_scene_with_retry(
    producer: &mut dyn SceneProducer,
    request: &SceneRequest,
    attempts: u32,
) -> Result<Scene, SceneCreationError> {
    let mut last_failure = None;
    for attempt in 1..=attempts {
        let outcome = producer
            .produce_scene(request)
            .map_err(AttemptFailure::from)
            .and_then(|raw| parse_scene_json(&raw).map_err(AttemptFailure::from));
        match outcome {
            Ok(scene) => {
                info!(
                    topic = request.topic.as_str(),
                    attempt,
                    actor_count = scene.actors.len(),
                    action_count = scene.action_count(),
                    "scene_created"
                );
                return Ok(scene);
            }
            Err(failure) => {
                warn!(
                    topic = request.topic.as_str(),
                    attempt,
                    max_attempts = attempts,
                    error = %failure,
                    "scene_attempt_failed"
                );
                last_failure = Some(failure);
            }
        }
    }

    match last_failure {
        Some(last) => Err(SceneCreationError::Exhausted {
            topic: request.topic.clone(),
            attempts,
            last,
        }),
        None => Err(SceneCreationError::NoAttempts {
            topic: request.topic.clone(),
        }),
    }
}
