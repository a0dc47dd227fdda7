use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod actor;
pub mod app;
pub mod assets;
pub mod audio;
pub mod canvas;
pub mod capture;
pub mod director;
pub mod phrasing;
pub mod playback;
pub mod script;
pub mod sprites;
pub mod story;
pub mod timing;

pub use actor::{
    ActionError, ActionPhase, ActionRequest, ActionSlot, ActionTicket, Actor, ActorEvent,
    ActorTuning, LeaveSide,
};
pub use app::{
    run_window, run_window_with_metrics, AppError, FrameHost, HostFlow, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, Renderer, SLOW_FRAME_ENV_VAR,
};
pub use assets::{
    AssetError, AssetKey, AssetSource, AudioTrack, FsAssetSource, LoadCompleter, LoadSlot,
    LoadedImage, MemoryAssetSource,
};
pub use audio::{SilentPlayer, SoundtrackPlayer, DEFAULT_SOUNDTRACK_VOLUME};
#[cfg(feature = "audio")]
pub use audio::{AudioDeviceError, RodioPlayer};
pub use canvas::{ActorSprite, Canvas, DrawCommand, FrameBuffer, RecordingCanvas};
pub use capture::{CaptureError, CaptureSession, CaptureState, CaptureSummary, CapturedFrame};
pub use director::{
    ActorLookupError, CursorState, DirectorConfig, DispatchError, PacingPolicy, SceneDirector,
    SceneEvent, SceneEventQueue, SceneObserver, SceneSlot, SceneToken,
};
pub use phrasing::{FixedPhrasing, RandomPhrasing, SpeechPhrasing};
pub use playback::{FrameRequest, FrameScheduler, FrameTarget, ManualScheduler, PlaybackLoop};
pub use script::{
    create_scene_with_retry, parse_scene_json, validate_scene, ActionKind, ActorId, BackdropId,
    Facing, MusicId, ProducerError, Scene, SceneAction, SceneActor, SceneCreationError,
    SceneProducer, SceneRequest, SceneValidationError, SCENE_CREATION_ATTEMPTS,
};
pub use sprites::{Clip, SpriteAnimationSet, SpriteSheet};
pub use story::{parse_story_json, StoryError, StoryGraph, StoryNode, StoryWalk};
pub use timing::{Clock, FrameTime, ManualClock, SystemClock};

pub const ROOT_ENV_VAR: &str = "STORYPLAY_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub asset_root: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "STORYPLAY_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/storyplay\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let asset_root = root.join("assets");
    Ok(AppPaths { root, asset_root })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            find_root_from(&exe_dir).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| is_repo_marker(candidate))
        .map(normalize_path)
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("assets")).expect("assets dir");
        assert!(!is_repo_marker(dir.path()));

        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("manifest");
        assert!(is_repo_marker(dir.path()));
    }

    #[test]
    fn root_is_found_from_a_nested_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("manifest");
        fs::create_dir(dir.path().join("crates")).expect("crates dir");
        let nested = dir.path().join("target").join("debug");
        fs::create_dir_all(&nested).expect("nested");

        let found = find_root_from(&nested).expect("root");
        assert_eq!(found, normalize_path(dir.path()));
    }
}
