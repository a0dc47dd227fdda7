use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use scene_engine::{
    parse_story_json, ActorId, AudioTrack, DirectorConfig, FrameBuffer, HostFlow, ManualClock,
    ManualScheduler, MemoryAssetSource, MusicId, SoundtrackPlayer, StoryWalk,
};

use super::headless::{simulate, write_report, SimulationOptions};
use super::stage::{Stage, StageReport};
use super::supply::{
    topic_slug, DirectorySceneProducer, FileSceneList, SceneSupply, StorySceneSupply,
};

const SLIME_SPEAKS: &str = r#"{
    "characters": [{"character": "slime", "position": 0.2, "direction": "right"}],
    "backdrop": "lake",
    "music": "calm1",
    "actions": [{"character": "slime", "actionType": "speak", "target": "blub"}]
}"#;

const KNIGHT_CHARGES: &str = r#"{
    "characters": [
        {"character": "knight", "position": 0.1, "direction": "right"},
        {"character": "orc", "position": 0.8, "direction": "left"}
    ],
    "backdrop": "castle",
    "music": "battle1",
    "actions": [
        {"character": "knight", "actionType": "move", "target": "orc"},
        {"character": "knight", "actionType": "speak", "target": "Halt!"}
    ]
}"#;

const UNKNOWN_BACKDROP: &str = r#"{
    "characters": [],
    "backdrop": "moon",
    "music": "calm1",
    "actions": []
}"#;

const STORY: &str = r#"{
    "paths": [
        {"topic": "A knight guards the castle", "paths": [
            {"topic": "An orc approaches"},
            {"topic": "A slime wanders in"}
        ]}
    ]
}"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write scene file");
    path
}

fn headless_stage(
    supply: Box<dyn SceneSupply>,
    assets: MemoryAssetSource,
) -> (Stage<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let stage = Stage::new(
        clock.clone(),
        Box::new(assets),
        supply,
        DirectorConfig::default(),
    )
    .with_phrasing_seed(Some(11))
    .with_max_frame_delta(None);
    (stage, clock)
}

fn run_headless(supply: Box<dyn SceneSupply>, options: SimulationOptions) -> StageReport {
    let (stage, clock) = headless_stage(supply, MemoryAssetSource::new());
    simulate(stage, &clock, (320, 240), options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoundtrackCall {
    Play(MusicId),
    Stop,
}

#[derive(Clone, Default)]
struct RecordingPlayer {
    calls: Rc<RefCell<Vec<SoundtrackCall>>>,
}

impl SoundtrackPlayer for RecordingPlayer {
    fn play(&mut self, track: &AudioTrack) {
        self.calls.borrow_mut().push(SoundtrackCall::Play(track.music));
    }

    fn stop(&mut self) {
        self.calls.borrow_mut().push(SoundtrackCall::Stop);
    }
}

fn scored_assets() -> MemoryAssetSource {
    let mut assets = MemoryAssetSource::new();
    assets.insert_music(MusicId::Calm1, vec![1, 2, 3]);
    assets.insert_music(MusicId::Battle1, vec![4, 5, 6]);
    assets
}

fn seeded() -> SimulationOptions {
    SimulationOptions {
        seed: Some(3),
        ..SimulationOptions::default()
    }
}

#[test]
fn scene_files_play_in_order_and_are_captured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_file(dir.path(), "first.json", SLIME_SPEAKS);
    let second = write_file(dir.path(), "second.json", KNIGHT_CHARGES);
    let mut assets = MemoryAssetSource::new();
    assets.insert_music(MusicId::Calm1, vec![1, 2, 3]);
    let (stage, clock) = headless_stage(Box::new(FileSceneList::new([first, second])), assets);

    let report = simulate(stage, &clock, (320, 240), seeded());

    assert_eq!(report.scenes_played, 2);
    assert!(report.supply_failures.is_empty());
    assert_eq!(report.soundtracks, vec![MusicId::Calm1]);
    assert_eq!(report.transcript.len(), 2);
    assert_eq!(report.transcript[0].actor, ActorId::Slime);
    assert!(report.transcript[0].text.contains("blub"));
    assert!(report.transcript[0].text.contains("Slime"));
    assert!(report.transcript[0].scene.ends_with("first.json"));
    assert_eq!(report.transcript[1].actor, ActorId::Knight);
    assert!(report.transcript[1].text.contains("Halt!"));
    assert!(report.transcript[0].at_ms < report.transcript[1].at_ms);

    let capture = report.capture.expect("capture summary");
    assert_eq!(capture.scenes, 2);
    assert!(capture.frames > 0);
    assert_eq!(capture.digest.len(), 64);
}

#[test]
fn invalid_scene_file_is_skipped_and_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bad = write_file(dir.path(), "bad.json", UNKNOWN_BACKDROP);
    let good = write_file(dir.path(), "good.json", SLIME_SPEAKS);

    let report = run_headless(Box::new(FileSceneList::new([bad, good])), seeded());

    assert_eq!(report.scenes_played, 1);
    assert_eq!(report.supply_failures.len(), 1);
    assert!(report.supply_failures[0].contains("bad.json"));
}

#[test]
fn missing_scene_file_plays_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.json");

    let report = run_headless(Box::new(FileSceneList::new([missing])), seeded());

    assert_eq!(report.scenes_played, 0);
    assert_eq!(report.supply_failures.len(), 1);
    assert_eq!(report.capture.map(|capture| capture.frames), Some(0));
}

#[test]
fn same_seed_gives_identical_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_file(dir.path(), "first.json", KNIGHT_CHARGES);
    let options = SimulationOptions {
        jitter_ms: 6,
        seed: Some(42),
        ..SimulationOptions::default()
    };

    let one = run_headless(Box::new(FileSceneList::new([first.clone()])), options);
    let two = run_headless(Box::new(FileSceneList::new([first])), options);

    assert_eq!(one, two);
}

#[test]
fn time_limit_abandons_the_running_scene() {
    let dir = tempfile::tempdir().expect("tempdir");
    let long = write_file(dir.path(), "long.json", KNIGHT_CHARGES);
    let options = SimulationOptions {
        max_seconds: 1,
        ..seeded()
    };

    let report = run_headless(Box::new(FileSceneList::new([long])), options);

    assert_eq!(report.scenes_played, 0);
    assert!(report.transcript.is_empty());
    assert!(report.capture.map_or(0, |capture| capture.frames) > 0);
}

#[test]
fn stage_exits_when_nothing_is_supplied() {
    let (mut stage, _clock) = headless_stage(
        Box::new(FileSceneList::new(Vec::<PathBuf>::new())),
        MemoryAssetSource::new(),
    );
    let mut scheduler = ManualScheduler::new();
    let mut canvas = FrameBuffer::new(16, 16);

    stage.begin(&mut scheduler);
    assert!(stage.is_done());
    assert_eq!(
        stage.advance(scheduler.take_due(), &mut scheduler, &mut canvas),
        HostFlow::Exit
    );
    assert_eq!(stage.finish().scenes_played, 0);
}

#[test]
fn caption_follows_the_speaking_actor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = write_file(dir.path(), "scene.json", SLIME_SPEAKS);
    let (mut stage, clock) = headless_stage(
        Box::new(FileSceneList::new([scene])),
        MemoryAssetSource::new(),
    );
    let mut scheduler = ManualScheduler::new();
    let mut canvas = FrameBuffer::new(64, 48);
    stage.begin(&mut scheduler);

    clock.advance(Duration::from_millis(16));
    stage.advance(scheduler.take_due(), &mut scheduler, &mut canvas);
    let caption = stage.caption().expect("caption after first frame");
    assert!(caption.contains("blub"));

    clock.advance(Duration::from_secs(4));
    stage.advance(scheduler.take_due(), &mut scheduler, &mut canvas);
    assert_eq!(stage.caption(), None);
}

#[test]
fn story_plays_the_chosen_branch() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a-knight-guards-the-castle.json", KNIGHT_CHARGES);
    write_file(dir.path(), "a-slime-wanders-in.json", SLIME_SPEAKS);
    let walk = StoryWalk::new(parse_story_json(STORY).expect("story"));
    let supply = StorySceneSupply::new(
        walk,
        [0, 1],
        Box::new(DirectorySceneProducer::new(dir.path())),
    );

    let report = run_headless(Box::new(supply), seeded());

    assert_eq!(report.scenes_played, 2);
    let scenes = report
        .transcript
        .iter()
        .map(|line| line.scene.as_str())
        .collect::<Vec<_>>();
    assert_eq!(scenes, vec!["A knight guards the castle", "A slime wanders in"]);
}

#[test]
fn story_stops_when_a_scene_cannot_be_produced() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "a-knight-guards-the-castle.json", SLIME_SPEAKS);
    let walk = StoryWalk::new(parse_story_json(STORY).expect("story"));
    let supply = StorySceneSupply::new(
        walk,
        Vec::new(),
        Box::new(DirectorySceneProducer::new(dir.path())),
    );

    let report = run_headless(Box::new(supply), seeded());

    assert_eq!(report.scenes_played, 1);
    assert_eq!(report.supply_failures.len(), 1);
    assert!(report.supply_failures[0].contains("An orc approaches"));
}

#[test]
fn topic_slugs_are_file_friendly() {
    assert_eq!(topic_slug("The Knight's  Return!"), "the-knight-s-return");
    assert_eq!(topic_slug("  village2 at dusk "), "village2-at-dusk");
    assert_eq!(
        DirectorySceneProducer::new("scenes").path_for("An orc approaches"),
        PathBuf::from("scenes").join("an-orc-approaches.json")
    );
}

#[test]
fn reports_render_as_text_and_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene = write_file(dir.path(), "scene.json", SLIME_SPEAKS);
    let report = run_headless(Box::new(FileSceneList::new([scene])), seeded());

    let mut text = Vec::new();
    write_report(&mut text, &report, false).expect("text report");
    let text = String::from_utf8(text).expect("utf8");
    assert!(text.contains("blub"));
    assert!(text.contains("scenes played: 1, actions skipped: 0"));
    assert!(text.contains("capture: "));

    let mut json = Vec::new();
    write_report(&mut json, &report, true).expect("json report");
    let value: serde_json::Value = serde_json::from_slice(&json).expect("json");
    assert_eq!(value["scenes_played"], 1);
    assert_eq!(value["transcript"][0]["actor"], "slime");
}

#[test]
fn each_scene_plays_its_soundtrack_until_it_finishes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_file(dir.path(), "first.json", SLIME_SPEAKS);
    let second = write_file(dir.path(), "second.json", KNIGHT_CHARGES);
    let player = RecordingPlayer::default();
    let (stage, clock) = headless_stage(
        Box::new(FileSceneList::new([first, second])),
        scored_assets(),
    );
    let stage = stage.with_soundtrack_player(Box::new(player.clone()));

    let report = simulate(stage, &clock, (320, 240), seeded());

    assert_eq!(report.scenes_played, 2);
    assert_eq!(
        *player.calls.borrow(),
        vec![
            SoundtrackCall::Play(MusicId::Calm1),
            SoundtrackCall::Stop,
            SoundtrackCall::Play(MusicId::Battle1),
            SoundtrackCall::Stop,
        ]
    );
}

#[test]
fn abandoned_scene_stops_its_soundtrack() {
    let dir = tempfile::tempdir().expect("tempdir");
    let long = write_file(dir.path(), "long.json", KNIGHT_CHARGES);
    let player = RecordingPlayer::default();
    let (stage, clock) = headless_stage(Box::new(FileSceneList::new([long])), scored_assets());
    let stage = stage.with_soundtrack_player(Box::new(player.clone()));
    let options = SimulationOptions {
        max_seconds: 1,
        ..seeded()
    };

    let report = simulate(stage, &clock, (320, 240), options);
    assert_eq!(report.scenes_played, 0);
    assert_eq!(
        *player.calls.borrow(),
        vec![SoundtrackCall::Play(MusicId::Battle1), SoundtrackCall::Stop]
    );
}
