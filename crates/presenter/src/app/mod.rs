pub(crate) mod bootstrap;
pub(crate) mod headless;
mod stage;
mod supply;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use scene_engine::{
    parse_story_json, resolve_app_paths, run_window, AppError, AssetSource, DirectorConfig,
    FsAssetSource, LoopConfig, ManualClock, MemoryAssetSource, SilentPlayer, SoundtrackPlayer,
    StartupError, StoryError, StoryGraph, StoryWalk, SystemClock,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::Command;
use headless::SimulationOptions;
use stage::Stage;
use supply::{
    read_scene_file, DirectorySceneProducer, FileSceneList, SceneSupply, StorySceneSupply,
};

#[derive(Debug, Error)]
pub(crate) enum PresenterError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("story file {path} is invalid: {source}")]
    Story {
        path: PathBuf,
        #[source]
        source: StoryError,
    },
    #[error("{invalid} of {total} scene files failed validation")]
    InvalidScenes { invalid: usize, total: usize },
    #[error("no scene could be played ({failures} supply failures)")]
    NothingPlayed { failures: usize },
    #[error("failed to write report: {0}")]
    Report(#[source] io::Error),
}

pub(crate) fn run(command: Command) -> Result<(), PresenterError> {
    match command {
        Command::Validate { scenes } => validate(&scenes),
        Command::Play {
            scenes,
            seed,
            volume,
        } => play_in_window(Box::new(FileSceneList::new(scenes)), seed, volume),
        Command::Simulate { scenes, options } => {
            play_headless(Box::new(FileSceneList::new(scenes)), options)
        }
        Command::Story {
            story,
            scene_dir,
            choices,
            volume,
            headless,
        } => {
            let walk = StoryWalk::new(read_story(&story)?);
            let supply = Box::new(StorySceneSupply::new(
                walk,
                choices,
                Box::new(DirectorySceneProducer::new(scene_dir)),
            ));
            match headless {
                Some(options) => play_headless(supply, options),
                None => play_in_window(supply, None, volume),
            }
        }
    }
}

fn validate(scenes: &[PathBuf]) -> Result<(), PresenterError> {
    let mut invalid = 0usize;
    for path in scenes {
        match read_scene_file(path) {
            Ok(scene) => {
                println!(
                    "ok      {} ({} characters, {} actions)",
                    path.display(),
                    scene.actors.len(),
                    scene.action_count()
                );
            }
            Err(error) => {
                invalid += 1;
                println!("invalid {error}");
            }
        }
    }
    info!(total = scenes.len(), invalid, "validation_finished");

    if invalid > 0 {
        return Err(PresenterError::InvalidScenes {
            invalid,
            total: scenes.len(),
        });
    }
    Ok(())
}

fn read_story(path: &Path) -> Result<StoryGraph, PresenterError> {
    let raw = fs::read_to_string(path).map_err(|source| PresenterError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_story_json(&raw).map_err(|source| PresenterError::Story {
        path: path.to_path_buf(),
        source,
    })
}

fn play_in_window(
    supply: Box<dyn SceneSupply>,
    seed: Option<u64>,
    volume: f32,
) -> Result<(), PresenterError> {
    let paths = resolve_app_paths()?;
    info!(asset_root = %paths.asset_root.display(), "asset_root_resolved");

    let config = LoopConfig::default();
    let director_config = DirectorConfig {
        surface_width: config.surface_width,
        surface_height: config.surface_height,
        ..DirectorConfig::default()
    };
    let stage = Stage::new(
        SystemClock::new(),
        Box::new(FsAssetSource::new(paths.asset_root)),
        supply,
        director_config,
    )
    .with_phrasing_seed(seed)
    .with_soundtrack_player(soundtrack_player(volume));

    run_window(config, stage)?;
    Ok(())
}

fn play_headless(
    supply: Box<dyn SceneSupply>,
    options: SimulationOptions,
) -> Result<(), PresenterError> {
    let director_config = DirectorConfig::default();
    let clock = ManualClock::new();
    let stage = Stage::new(clock.clone(), headless_assets(), supply, director_config)
        .with_phrasing_seed(options.seed)
        .with_max_frame_delta(None);

    let report = headless::simulate(
        stage,
        &clock,
        (director_config.surface_width, director_config.surface_height),
        options,
    );
    headless::write_report(&mut io::stdout().lock(), &report, options.json)
        .map_err(PresenterError::Report)?;

    if report.scenes_played == 0 && !report.supply_failures.is_empty() {
        return Err(PresenterError::NothingPlayed {
            failures: report.supply_failures.len(),
        });
    }
    Ok(())
}

#[cfg(feature = "audio")]
fn soundtrack_player(volume: f32) -> Box<dyn SoundtrackPlayer> {
    match scene_engine::RodioPlayer::try_default(volume) {
        Ok(player) => Box::new(player),
        Err(error) => {
            warn!(error = %error, "audio_unavailable_playing_silently");
            Box::new(SilentPlayer)
        }
    }
}

#[cfg(not(feature = "audio"))]
fn soundtrack_player(volume: f32) -> Box<dyn SoundtrackPlayer> {
    info!(volume, "audio_feature_disabled_playing_silently");
    Box::new(SilentPlayer)
}

/// Disk assets when a project root is around, otherwise placeholders only.
fn headless_assets() -> Box<dyn AssetSource> {
    match resolve_app_paths() {
        Ok(paths) => Box::new(FsAssetSource::new(paths.asset_root)),
        Err(error) => {
            warn!(error = %error, "asset_root_unavailable_using_placeholders");
            Box::new(MemoryAssetSource::new())
        }
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
