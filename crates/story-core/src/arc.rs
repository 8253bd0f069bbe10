//! Multi-week story arcs: immutable definitions and engine-owned progress.

use crate::{ArcId, EventId};
use serde::{Deserialize, Serialize};

/// One checkpoint of an arc, satisfied by any of its qualifying events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcStage {
    pub name: String,
    pub events: Vec<EventId>,
}

/// Authored arc definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcDefinition {
    pub id: ArcId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<ArcStage>,
}

impl ArcDefinition {
    pub fn new(id: impl Into<ArcId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, name: impl Into<String>, events: Vec<EventId>) -> Self {
        self.stages.push(ArcStage {
            name: name.into(),
            events,
        });
        self
    }

    /// Whether `event` is a qualifying event of stage `stage`.
    pub fn qualifies(&self, stage: usize, event: &EventId) -> bool {
        self.stages
            .get(stage)
            .map(|s| s.events.contains(event))
            .unwrap_or(false)
    }
}

/// Lifecycle of an arc.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArcState {
    #[default]
    Inactive,
    Active,
    Complete,
    Failed,
}

impl ArcState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ArcState::Complete | ArcState::Failed)
    }
}

/// Runtime progress through an arc.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcProgress {
    /// Index of the next stage to complete; equals the stage count once complete.
    pub current_stage: usize,
    pub state: ArcState,
}
