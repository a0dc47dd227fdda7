use std::collections::HashSet;

use serde_json::error::Category;
use thiserror::Error;
use tracing::warn;

use super::{ActorId, Scene};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneValidationError {
    #[error("parse scene json: {message}")]
    Parse { message: String },
    #[error("parse scene json at {path}: {message}")]
    ParseAt { path: String, message: String },
    #[error("validation failed at characters[{index}].position: expected number in [0, 1], got {value}")]
    PositionOutOfRange { index: usize, value: f32 },
    #[error("validation failed at characters[{index}].character: '{actor}' is declared more than once")]
    DuplicateActor { index: usize, actor: ActorId },
}

pub fn parse_scene_json(raw: &str) -> Result<Scene, SceneValidationError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let scene = match serde_path_to_error::deserialize::<_, Scene>(&mut deserializer) {
        Ok(scene) => scene,
        Err(error) => {
            let path = error.path().to_string();
            let inner = error.into_inner();
            let message = inner.to_string();
            // Only data errors sit at a meaningful path; syntax and EOF
            // errors report wherever the tokenizer stopped.
            let located = inner.classify() == Category::Data && !path.is_empty() && path != ".";
            return if located {
                Err(SceneValidationError::ParseAt { path, message })
            } else {
                Err(SceneValidationError::Parse { message })
            };
        }
    };
    validate_scene(&scene)?;
    Ok(scene)
}

/// Checks what the type system cannot: start positions and actor uniqueness.
/// Actions that name an undeclared actor are reported but accepted; the
/// director skips them at playback time.
pub fn validate_scene(scene: &Scene) -> Result<(), SceneValidationError> {
    let mut seen = HashSet::new();
    for (index, declared) in scene.actors.iter().enumerate() {
        let position = declared.start_position;
        if !position.is_finite() || !(0.0..=1.0).contains(&position) {
            return Err(SceneValidationError::PositionOutOfRange {
                index,
                value: position,
            });
        }
        if !seen.insert(declared.actor) {
            return Err(SceneValidationError::DuplicateActor {
                index,
                actor: declared.actor,
            });
        }
    }

    for (index, action) in scene.actions.iter().enumerate() {
        if !seen.contains(&action.actor) {
            warn!(
                action_index = index,
                actor = %action.actor,
                kind = %action.kind,
                "scene_action_references_undeclared_actor"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ActionKind, BackdropId, Facing, MusicId};

    const VALID_SCENE: &str = r#"{
        "characters": [
            {"character": "knight", "position": 0.1, "direction": "right"},
            {"character": "orc", "position": 0.8, "direction": "left"}
        ],
        "backdrop": "castle",
        "music": "battle1",
        "actions": [
            {"character": "knight", "actionType": "speak", "target": "Halt, orc!"},
            {"character": "knight", "actionType": "move", "target": "orc"},
            {"character": "knight", "actionType": "attack01", "target": "orc"},
            {"character": "orc", "actionType": "death", "target": ""}
        ]
    }"#;

    #[test]
    fn parses_producer_scene_format() {
        let scene = parse_scene_json(VALID_SCENE).expect("scene");
        assert_eq!(scene.actors.len(), 2);
        assert_eq!(scene.actors[1].facing, Facing::Left);
        assert_eq!(scene.backdrop, BackdropId::Castle);
        assert_eq!(scene.music, MusicId::Battle1);
        assert_eq!(scene.actions[2].kind, ActionKind::Attack);
        assert_eq!(scene.actions[1].parameter, "orc");
    }

    #[test]
    fn unknown_actor_reports_json_path() {
        let raw = VALID_SCENE.replace(
            r#""character": "orc", "position""#,
            r#""character": "dragon", "position""#,
        );
        let error = parse_scene_json(&raw).expect_err("dragon is not an actor");
        match error {
            SceneValidationError::ParseAt { path, .. } => {
                assert_eq!(path, "characters[1].character");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        let raw = VALID_SCENE.replace("\"death\"", "\"dance\"");
        let error = parse_scene_json(&raw).expect_err("dance is not an action");
        assert!(matches!(
            error,
            SceneValidationError::ParseAt { ref path, .. } if path == "actions[3].actionType"
        ));
    }

    #[test]
    fn non_string_target_is_rejected() {
        let raw = VALID_SCENE.replace(r#""target": """#, r#""target": 3"#);
        assert!(parse_scene_json(&raw).is_err());
    }

    #[test]
    fn position_outside_unit_range_is_rejected() {
        let raw = VALID_SCENE.replace("0.8", "1.5");
        let error = parse_scene_json(&raw).expect_err("out of range");
        assert_eq!(
            error,
            SceneValidationError::PositionOutOfRange {
                index: 1,
                value: 1.5
            }
        );
    }

    #[test]
    fn duplicate_actor_is_rejected() {
        let raw = VALID_SCENE.replace(
            r#""character": "orc", "position""#,
            r#""character": "knight", "position""#,
        );
        let error = parse_scene_json(&raw).expect_err("duplicate");
        assert!(matches!(
            error,
            SceneValidationError::DuplicateActor {
                index: 1,
                actor: ActorId::Knight
            }
        ));
    }

    #[test]
    fn undeclared_action_actor_is_accepted() {
        let raw = VALID_SCENE.replace(
            r#"{"character": "orc", "actionType": "death""#,
            r#"{"character": "wizard", "actionType": "death""#,
        );
        let scene = parse_scene_json(&raw).expect("accepted");
        assert!(scene.declared_actor(ActorId::Wizard).is_none());
    }

    #[test]
    fn malformed_json_has_no_path() {
        let error = parse_scene_json("{not json").expect_err("malformed");
        assert!(matches!(error, SceneValidationError::Parse { .. }));
    }

    #[test]
    fn truncated_document_has_no_path() {
        let raw = r#"{"characters": [{"character": "knight", "position": 0.1"#;
        let error = parse_scene_json(raw).expect_err("truncated");
        match error {
            SceneValidationError::Parse { message } => assert!(message.contains("EOF")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
