//! Arc progression.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use story_core::{ArcDefinition, ArcId, ArcProgress, ArcRef, ArcState, EventId};
use tracing::{debug, info};

/// Before/after record of one arc transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcUpdate {
    pub arc: ArcId,
    pub before: ArcProgress,
    pub after: ArcProgress,
}

/// Engine-owned progress for every arc that has left `Inactive`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArcTracker {
    progress: BTreeMap<ArcId, ArcProgress>,
}

impl ArcTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress for `arc`; arcs never touched are `Inactive` at stage 0.
    pub fn progress(&self, arc: &ArcId) -> ArcProgress {
        self.progress.get(arc).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArcId, &ArcProgress)> {
        self.progress.iter()
    }

    /// Advance `arc` after `completed` resolved with an arc-advancing choice.
    ///
    /// An inactive arc starts only when `completed` qualifies for its first
    /// stage; an active arc moves forward exactly one stage when `completed`
    /// qualifies for the current stage. Completing the last stage completes
    /// the arc. Anything else, including calls on finished arcs, is a no-op.
    pub fn advance(&mut self, arc: &ArcDefinition, completed: &EventId) -> Option<ArcUpdate> {
        let before = self.progress(&arc.id);
        let stage = match before.state {
            ArcState::Inactive => 0,
            ArcState::Active => before.current_stage,
            ArcState::Complete | ArcState::Failed => {
                debug!(arc = %arc.id, state = ?before.state, "ignoring advance on finished arc");
                return None;
            }
        };
        if !arc.qualifies(stage, completed) {
            debug!(arc = %arc.id, stage, event = %completed, "event does not qualify for current stage");
            return None;
        }
        let next = stage + 1;
        let after = ArcProgress {
            current_stage: next,
            state: if next >= arc.stages.len() {
                ArcState::Complete
            } else {
                ArcState::Active
            },
        };
        self.progress.insert(arc.id.clone(), after);
        info!(arc = %arc.id, stage = next, state = ?after.state, "arc advanced");
        Some(ArcUpdate {
            arc: arc.id.clone(),
            before,
            after,
        })
    }

    /// Force `arc` into `Failed` unless it already finished.
    pub fn fail(&mut self, arc: &ArcId) -> Option<ArcUpdate> {
        let before = self.progress(arc);
        if before.state.is_terminal() {
            return None;
        }
        let after = ArcProgress {
            current_stage: before.current_stage,
            state: ArcState::Failed,
        };
        self.progress.insert(arc.clone(), after);
        info!(%arc, stage = before.current_stage, "arc failed");
        Some(ArcUpdate {
            arc: arc.clone(),
            before,
            after,
        })
    }

    /// Whether an event tagged `arc_ref` may currently be offered: inactive
    /// arcs admit stage 0, active arcs admit their current stage only.
    pub fn admits(&self, arc_ref: &ArcRef) -> bool {
        let p = self.progress(&arc_ref.arc);
        match p.state {
            ArcState::Inactive => arc_ref.stage == 0,
            ArcState::Active => arc_ref.stage == p.current_stage,
            ArcState::Complete | ArcState::Failed => false,
        }
    }
}
