use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script::SceneRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryNode {
    pub topic: String,
    #[serde(default)]
    pub paths: Vec<StoryNode>,
}

/// Branching story outline. The root has no topic of its own; its paths are
/// the opening choices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryGraph {
    #[serde(default)]
    pub paths: Vec<StoryNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    #[error("parse story json at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("choice {index} is out of range ({available} available)")]
    ChoiceOutOfRange { index: usize, available: usize },
    #[error("the story has ended; there is nothing left to choose")]
    Ended,
}

pub fn parse_story_json(raw: &str) -> Result<StoryGraph, StoryError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, StoryGraph>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        StoryError::Parse {
            path,
            message: error.into_inner().to_string(),
        }
    })
}

/// Walks one branch of a [`StoryGraph`], remembering the topics picked so far.
#[derive(Debug, Clone)]
pub struct StoryWalk {
    graph: StoryGraph,
    selection: Vec<usize>,
    history: Vec<String>,
}

impl StoryWalk {
    pub fn new(graph: StoryGraph) -> Self {
        Self {
            graph,
            selection: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&StoryNode> {
        let (&first, rest) = self.selection.split_first()?;
        let mut node = self.graph.paths.get(first)?;
        for &index in rest {
            node = node.paths.get(index)?;
        }
        Some(node)
    }

    pub fn choices(&self) -> &[StoryNode] {
        match self.current() {
            Some(node) => &node.paths,
            None if self.selection.is_empty() => &self.graph.paths,
            None => &[],
        }
    }

    pub fn is_ending(&self) -> bool {
        self.choices().is_empty()
    }

    pub fn choose(&mut self, index: usize) -> Result<&StoryNode, StoryError> {
        let available = self.choices().len();
        if available == 0 {
            return Err(StoryError::Ended);
        }
        if index >= available {
            return Err(StoryError::ChoiceOutOfRange { index, available });
        }
        let topic = self.choices()[index].topic.clone();
        self.selection.push(index);
        self.history.push(topic);
        self.current().ok_or(StoryError::Ended)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Request for the scene depicting the current node. The follow-up topics
    /// let the producer keep every next branch plausible.
    pub fn scene_request(&self) -> Option<SceneRequest> {
        let node = self.current()?;
        let story_so_far = self.history[..self.history.len().saturating_sub(1)].to_vec();
        Some(SceneRequest {
            topic: node.topic.clone(),
            follow_ups: node.paths.iter().map(|path| path.topic.clone()).collect(),
            story_so_far,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = r#"{
        "paths": [
            {"topic": "A knight guards the castle", "paths": [
                {"topic": "An orc approaches", "paths": [
                    {"topic": "The knight fights"},
                    {"topic": "The knight flees"}
                ]},
                {"topic": "A wizard visits"}
            ]},
            {"topic": "A slime sleeps by the lake"}
        ]
    }"#;

    #[test]
    fn root_choices_are_opening_paths() {
        let walk = StoryWalk::new(parse_story_json(STORY).expect("story"));
        assert!(walk.current().is_none());
        assert_eq!(walk.choices().len(), 2);
        assert!(!walk.is_ending());
        assert!(walk.scene_request().is_none());
    }

    #[test]
    fn choosing_descends_and_records_history() {
        let mut walk = StoryWalk::new(parse_story_json(STORY).expect("story"));
        walk.choose(0).expect("root choice");
        let node = walk.choose(0).expect("second choice");
        assert_eq!(node.topic, "An orc approaches");
        assert_eq!(
            walk.history(),
            &["A knight guards the castle".to_string(), "An orc approaches".to_string()]
        );

        let request = walk.scene_request().expect("request");
        assert_eq!(request.topic, "An orc approaches");
        assert_eq!(request.follow_ups, vec!["The knight fights", "The knight flees"]);
        assert_eq!(request.story_so_far, vec!["A knight guards the castle"]);
    }

    #[test]
    fn leaf_is_an_ending() {
        let mut walk = StoryWalk::new(parse_story_json(STORY).expect("story"));
        walk.choose(1).expect("slime");
        assert!(walk.is_ending());
        assert_eq!(walk.choose(0), Err(StoryError::Ended));
    }

    #[test]
    fn out_of_range_choice_is_rejected() {
        let mut walk = StoryWalk::new(parse_story_json(STORY).expect("story"));
        assert_eq!(
            walk.choose(5),
            Err(StoryError::ChoiceOutOfRange {
                index: 5,
                available: 2
            })
        );
        assert!(walk.history().is_empty());
    }

    #[test]
    fn missing_topic_reports_path() {
        let error = parse_story_json(r#"{"paths":[{"paths":[]}]}"#).expect_err("topic missing");
        assert!(matches!(error, StoryError::Parse { ref path, .. } if path == "paths[0]"));
    }
}
