use std::path::PathBuf;
use std::str::FromStr;

use scene_engine::DEFAULT_SOUNDTRACK_VOLUME;

use crate::app::headless::SimulationOptions;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Validate {
        scenes: Vec<PathBuf>,
    },
    Play {
        scenes: Vec<PathBuf>,
        seed: Option<u64>,
        volume: f32,
    },
    Simulate {
        scenes: Vec<PathBuf>,
        options: SimulationOptions,
    },
    Story {
        story: PathBuf,
        scene_dir: PathBuf,
        choices: Vec<usize>,
        volume: f32,
        /// `None` plays in a window.
        headless: Option<SimulationOptions>,
    },
}

/// `Ok(None)` means help was requested.
pub(crate) fn parse_args(args: &[String]) -> Result<Option<Command>, String> {
    let Some(command) = args.first() else {
        return Err("missing subcommand".to_string());
    };
    let command_args = &args[1..];

    let parsed = match command.as_str() {
        "-h" | "--help" | "help" => return Ok(None),
        "validate" => {
            let scenes = collect_scene_paths(command_args, "validate")?;
            Command::Validate { scenes }
        }
        "play" => {
            let mut scenes = Vec::new();
            let mut seed = None;
            let mut volume = DEFAULT_SOUNDTRACK_VOLUME;
            let mut index = 0usize;
            while index < command_args.len() {
                match command_args[index].as_str() {
                    "--seed" => {
                        seed = Some(flag_value(command_args, index, "--seed", "u64")?);
                        index += 2;
                    }
                    "--volume" => {
                        volume = parse_volume(command_args, index)?;
                        index += 2;
                    }
                    other if other.starts_with("--") => {
                        return Err(format!("unknown play argument '{other}'"));
                    }
                    path => {
                        scenes.push(PathBuf::from(path));
                        index += 1;
                    }
                }
            }
            if scenes.is_empty() {
                return Err("play requires at least one scene file".to_string());
            }
            Command::Play {
                scenes,
                seed,
                volume,
            }
        }
        "simulate" => {
            let mut scenes = Vec::new();
            let mut options = SimulationOptions::default();
            let mut index = 0usize;
            while index < command_args.len() {
                if let Some(consumed) = parse_simulation_flag(command_args, index, &mut options)? {
                    index += consumed;
                    continue;
                }
                let arg = command_args[index].as_str();
                if arg.starts_with("--") {
                    return Err(format!("unknown simulate argument '{arg}'"));
                }
                scenes.push(PathBuf::from(arg));
                index += 1;
            }
            if scenes.is_empty() {
                return Err("simulate requires at least one scene file".to_string());
            }
            Command::Simulate { scenes, options }
        }
        "story" => {
            let (Some(story), Some(scene_dir)) = (command_args.first(), command_args.get(1))
            else {
                return Err("story requires <story.json> and <scene-dir>".to_string());
            };
            let mut choices = Vec::new();
            let mut headless = false;
            let mut volume = DEFAULT_SOUNDTRACK_VOLUME;
            let mut options = SimulationOptions::default();
            let mut index = 2usize;
            while index < command_args.len() {
                if let Some(consumed) = parse_simulation_flag(command_args, index, &mut options)? {
                    index += consumed;
                    continue;
                }
                match command_args[index].as_str() {
                    "--choices" => {
                        let raw: String = flag_value(command_args, index, "--choices", "list")?;
                        choices = parse_choices(&raw)?;
                        index += 2;
                    }
                    "--headless" => {
                        headless = true;
                        index += 1;
                    }
                    "--volume" => {
                        volume = parse_volume(command_args, index)?;
                        index += 2;
                    }
                    other => return Err(format!("unknown story argument '{other}'")),
                }
            }
            Command::Story {
                story: PathBuf::from(story),
                scene_dir: PathBuf::from(scene_dir),
                choices,
                volume,
                headless: headless.then_some(options),
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    Ok(Some(parsed))
}

fn collect_scene_paths(args: &[String], command: &str) -> Result<Vec<PathBuf>, String> {
    if args.is_empty() {
        return Err(format!("{command} requires at least one scene file"));
    }
    if let Some(flag) = args.iter().find(|arg| arg.starts_with("--")) {
        return Err(format!("unknown {command} argument '{flag}'"));
    }
    Ok(args.iter().map(PathBuf::from).collect())
}

/// Returns how many arguments the flag at `index` consumed, if it is one of
/// the simulation flags.
fn parse_simulation_flag(
    args: &[String],
    index: usize,
    options: &mut SimulationOptions,
) -> Result<Option<usize>, String> {
    match args[index].as_str() {
        "--fps" => {
            let fps: u32 = flag_value(args, index, "--fps", "u32")?;
            if fps == 0 {
                return Err("--fps must be greater than zero".to_string());
            }
            options.fps = fps;
            Ok(Some(2))
        }
        "--jitter-ms" => {
            options.jitter_ms = flag_value(args, index, "--jitter-ms", "u64")?;
            Ok(Some(2))
        }
        "--max-seconds" => {
            options.max_seconds = flag_value(args, index, "--max-seconds", "u64")?;
            Ok(Some(2))
        }
        "--seed" => {
            options.seed = Some(flag_value(args, index, "--seed", "u64")?);
            Ok(Some(2))
        }
        "--json" => {
            options.json = true;
            Ok(Some(1))
        }
        _ => Ok(None),
    }
}

fn flag_value<T: FromStr>(
    args: &[String],
    index: usize,
    flag: &str,
    expected: &str,
) -> Result<T, String> {
    let value = args
        .get(index + 1)
        .ok_or_else(|| format!("missing value for {flag}"))?;
    value
        .parse::<T>()
        .map_err(|_| format!("invalid {flag} value '{value}' (expected {expected})"))
}

fn parse_volume(args: &[String], index: usize) -> Result<f32, String> {
    let volume: f32 = flag_value(args, index, "--volume", "number in [0, 1]")?;
    if !(0.0..=1.0).contains(&volume) {
        return Err(format!("--volume must be within [0, 1], got {volume}"));
    }
    Ok(volume)
}

fn parse_choices(raw: &str) -> Result<Vec<usize>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<usize>()
                .map_err(|_| format!("invalid choice '{entry}' (expected a path index)"))
        })
        .collect()
}

pub(crate) fn usage_text() -> String {
    [
        "presenter - plays scene scripts",
        "",
        "Usage:",
        "  presenter validate <scene.json>...",
        "  presenter play <scene.json>... [--seed <u64>] [--volume <0..1>]",
        "  presenter simulate <scene.json>... [--fps <u32>] [--jitter-ms <u64>] [--max-seconds <u64>] [--seed <u64>] [--json]",
        "  presenter story <story.json> <scene-dir> [--choices <i,j,..>] [--volume <0..1>] [--headless [simulate flags]]",
        "",
        "Defaults:",
        "  --fps 60",
        "  --jitter-ms 0",
        "  --max-seconds 600",
        "  --volume 0.5 (soundtracks play when built with the `audio` feature)",
        "",
        "Environment:",
        "  STORYPLAY_ROOT           project root holding assets/",
        "  STORYPLAY_SLOW_FRAME_MS  artificial delay per window frame",
        "  RUST_LOG                 log filter (default info)",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn simulate_collects_scenes_and_flags() {
        let command = parse_args(&args(&[
            "simulate",
            "a.json",
            "--fps",
            "30",
            "b.json",
            "--jitter-ms",
            "4",
            "--json",
        ]))
        .expect("parse")
        .expect("command");

        assert_eq!(
            command,
            Command::Simulate {
                scenes: vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
                options: SimulationOptions {
                    fps: 30,
                    jitter_ms: 4,
                    json: true,
                    ..SimulationOptions::default()
                },
            }
        );
    }

    #[test]
    fn story_parses_choices_and_headless() {
        let command = parse_args(&args(&[
            "story",
            "story.json",
            "scenes",
            "--choices",
            "1, 0",
            "--headless",
            "--max-seconds",
            "90",
        ]))
        .expect("parse")
        .expect("command");

        let Command::Story {
            choices, headless, ..
        } = command
        else {
            panic!("expected story command");
        };
        assert_eq!(choices, vec![1, 0]);
        assert_eq!(headless.map(|options| options.max_seconds), Some(90));
    }

    #[test]
    fn story_without_headless_plays_in_window() {
        let command = parse_args(&args(&["story", "story.json", "scenes"]))
            .expect("parse")
            .expect("command");
        assert!(matches!(command, Command::Story { headless: None, .. }));
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["validate"])).is_err());
        assert!(parse_args(&args(&["simulate", "a.json", "--fps", "0"])).is_err());
        assert!(parse_args(&args(&["simulate", "a.json", "--fps"])).is_err());
        assert!(parse_args(&args(&["play", "a.json", "--loud"])).is_err());
        assert!(parse_args(&args(&["play", "a.json", "--volume", "1.5"])).is_err());
        assert!(parse_args(&args(&["story", "story.json"])).is_err());
        assert!(parse_args(&args(&["story", "s.json", "d", "--choices", "x"])).is_err());
        assert!(parse_args(&args(&["rewind"])).is_err());
    }

    #[test]
    fn play_takes_seed_and_volume() {
        let command = parse_args(&args(&["play", "a.json", "--volume", "0.25", "--seed", "9"]))
            .expect("parse")
            .expect("command");
        assert_eq!(
            command,
            Command::Play {
                scenes: vec![PathBuf::from("a.json")],
                seed: Some(9),
                volume: 0.25,
            }
        );

        let default = parse_args(&args(&["play", "a.json"]))
            .expect("parse")
            .expect("command");
        assert!(matches!(
            default,
            Command::Play { volume, .. } if volume == DEFAULT_SOUNDTRACK_VOLUME
        ));
    }

    #[test]
    fn help_is_not_an_error() {
        assert_eq!(parse_args(&args(&["--help"])), Ok(None));
    }
}
