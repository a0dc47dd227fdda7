use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use scene_engine::{
    create_scene_with_retry, parse_scene_json, ProducerError, Scene, SceneCreationError,
    SceneProducer, SceneRequest, SceneValidationError, StoryError, StoryWalk,
    SCENE_CREATION_ATTEMPTS,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub(crate) enum SupplyError {
    #[error("failed to read scene file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("scene file {path} is invalid: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: SceneValidationError,
    },
    #[error(transparent)]
    Story(#[from] StoryError),
    #[error(transparent)]
    Creation(#[from] SceneCreationError),
}

#[derive(Debug, Clone)]
pub(crate) struct SuppliedScene {
    pub(crate) label: String,
    pub(crate) scene: Scene,
}

/// Hands the stage one scene at a time until the presentation is over.
pub(crate) trait SceneSupply {
    fn next_scene(&mut self) -> Option<Result<SuppliedScene, SupplyError>>;
}

pub(crate) fn read_scene_file(path: &Path) -> Result<Scene, SupplyError> {
    let raw = fs::read_to_string(path).map_err(|source| SupplyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scene_json(&raw).map_err(|source| SupplyError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Scene files played in the order given.
#[derive(Debug, Clone)]
pub(crate) struct FileSceneList {
    paths: VecDeque<PathBuf>,
}

impl FileSceneList {
    pub(crate) fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

impl SceneSupply for FileSceneList {
    fn next_scene(&mut self) -> Option<Result<SuppliedScene, SupplyError>> {
        let path = self.paths.pop_front()?;
        Some(read_scene_file(&path).map(|scene| SuppliedScene {
            label: path.display().to_string(),
            scene,
        }))
    }
}

/// Producer backed by a directory of pre-generated scripts, one
/// `<slug>.json` per story topic.
#[derive(Debug, Clone)]
pub(crate) struct DirectorySceneProducer {
    dir: PathBuf,
}

impl DirectorySceneProducer {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn path_for(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{}.json", topic_slug(topic)))
    }
}

impl SceneProducer for DirectorySceneProducer {
    fn produce_scene(&mut self, request: &SceneRequest) -> Result<String, ProducerError> {
        let path = self.path_for(&request.topic);
        debug!(
            topic = request.topic.as_str(),
            path = %path.display(),
            "scene_file_requested"
        );
        fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ProducerError::NoScene(request.topic.clone()),
            _ => ProducerError::Unavailable(format!("{}: {source}", path.display())),
        })
    }
}

/// Lowercase ASCII alphanumerics with single dashes in between.
pub(crate) fn topic_slug(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut pending_dash = false;
    for ch in topic.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Walks a story along preselected choices, producing a scene for every node
/// visited. Missing choices take the first path.
pub(crate) struct StorySceneSupply {
    walk: StoryWalk,
    choices: VecDeque<usize>,
    producer: Box<dyn SceneProducer>,
    attempts: u32,
    done: bool,
}

impl StorySceneSupply {
    pub(crate) fn new(
        walk: StoryWalk,
        choices: impl IntoIterator<Item = usize>,
        producer: Box<dyn SceneProducer>,
    ) -> Self {
        Self {
            walk,
            choices: choices.into_iter().collect(),
            producer,
            attempts: SCENE_CREATION_ATTEMPTS,
            done: false,
        }
    }
}

impl SceneSupply for StorySceneSupply {
    fn next_scene(&mut self) -> Option<Result<SuppliedScene, SupplyError>> {
        if self.done {
            return None;
        }
        if self.walk.is_ending() {
            info!(chosen = self.walk.history().len(), "story_ended");
            self.done = true;
            return None;
        }

        let index = self.choices.pop_front().unwrap_or(0);
        if let Err(error) = self.walk.choose(index) {
            self.done = true;
            return Some(Err(error.into()));
        }
        let request = self.walk.scene_request()?;
        info!(
            topic = request.topic.as_str(),
            choice = index,
            follow_ups = request.follow_ups.len(),
            "story_node_entered"
        );

        match create_scene_with_retry(self.producer.as_mut(), &request, self.attempts) {
            Ok(scene) => Some(Ok(SuppliedScene {
                label: request.topic,
                scene,
            })),
            Err(error) => {
                self.done = true;
                Some(Err(error.into()))
            }
        }
    }
}
