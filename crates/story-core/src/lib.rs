#![deny(warnings)]

//! Core narrative data model for the deal-desk story engine.
//!
//! This crate defines the serializable types shared by the rules, engine and
//! content crates: authored events, choices and arcs, the read-only player/NPC
//! snapshot the engine evaluates against, and validation helpers that guard
//! authored-content invariants.

mod arc;
mod catalog;
mod event;
mod state;

pub use arc::*;
pub use catalog::*;
pub use event::*;
pub use state::*;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Authored identifier of a story event, e.g. "board_ultimatum".
    EventId
);
string_id!(
    /// Identifier of a choice, unique within its event.
    ChoiceId
);
string_id!(
    /// Identifier of a multi-week story arc.
    ArcId
);
string_id!(
    /// Identifier of a non-player character owned by the external state store.
    NpcId
);

/// Engine configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of optional events held in the queue.
    pub optional_capacity: usize,
    /// Seed for deterministic choice resolution.
    pub rng_seed: u64,
    /// Calendar date of the first day of week 1.
    pub start_date: NaiveDate,
    /// Width of the critical success/failure bands on a d100, in percent.
    pub critical_band: u32,
    /// Upper bound on same-turn chained follow-ups.
    pub max_chain_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optional_capacity: 5,
            rng_seed: 42,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            critical_band: 5,
            max_chain_depth: 8,
        }
    }
}

impl EngineConfig {
    /// Calendar date on which `week` (one-based) begins.
    pub fn week_start(&self, week: u32) -> NaiveDate {
        let offset = u64::from(week.saturating_sub(1)) * 7;
        self.start_date
            .checked_add_days(Days::new(offset))
            .unwrap_or(self.start_date)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.optional_capacity == 0 {
            return Err(ValidationError::InvalidConfig(
                "optional_capacity must be > 0".into(),
            ));
        }
        if self.critical_band > 50 {
            return Err(ValidationError::InvalidConfig(
                "critical_band must be within [0, 50]".into(),
            ));
        }
        Ok(())
    }
}

/// Validation errors for authored content and configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Identifiers must not be blank.
    #[error("blank identifier")]
    BlankId,
    /// Events need a title for the presentation layer.
    #[error("event {0} has no title")]
    MissingTitle(EventId),
    /// Every event needs at least one choice.
    #[error("event {0} has no choices")]
    NoChoices(EventId),
    /// Choice ids must be unique within an event.
    #[error("event {event} declares choice {choice} more than once")]
    DuplicateChoice { event: EventId, choice: ChoiceId },
    /// Flat success chance is a percentage.
    #[error("event {event} choice {choice}: success chance {chance} exceeds 100")]
    ChanceOutOfRange {
        event: EventId,
        choice: ChoiceId,
        chance: u8,
    },
    /// Scheduled follow-ups must land in a future week.
    #[error("event {event} choice {choice}: scheduled follow-up {target} must be >= 1 week out")]
    ScheduleInPast {
        event: EventId,
        choice: ChoiceId,
        target: EventId,
    },
    #[error("duplicate event id: {0}")]
    DuplicateEvent(EventId),
    #[error("duplicate arc id: {0}")]
    DuplicateArc(ArcId),
    /// Arcs need at least one stage and every stage at least one event.
    #[error("arc {arc} has an empty stage list or stage {stage} without events")]
    EmptyStage { arc: ArcId, stage: usize },
    /// Event references an arc that does not exist.
    #[error("event {event} references unknown arc {arc}")]
    UnknownArc { event: EventId, arc: ArcId },
    /// Event's arc stage is not listed in the arc definition.
    #[error("event {event} is not a qualifying event of arc {arc} stage {stage}")]
    StageMismatch {
        event: EventId,
        arc: ArcId,
        stage: usize,
    },
    /// Arc stage lists an event the catalog does not contain.
    #[error("arc {arc} stage {stage} references unknown event {event}")]
    ArcEventNotFound {
        arc: ArcId,
        stage: usize,
        event: EventId,
    },
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

/// Validate a single authored event in isolation.
pub fn validate_event(event: &StoryEvent) -> Result<(), ValidationError> {
    if event.id.0.trim().is_empty() {
        return Err(ValidationError::BlankId);
    }
    if event.title.trim().is_empty() {
        return Err(ValidationError::MissingTitle(event.id.clone()));
    }
    if event.choices.is_empty() {
        return Err(ValidationError::NoChoices(event.id.clone()));
    }
    let mut seen: BTreeSet<&ChoiceId> = BTreeSet::new();
    for choice in &event.choices {
        if choice.id.0.trim().is_empty() {
            return Err(ValidationError::BlankId);
        }
        if !seen.insert(&choice.id) {
            return Err(ValidationError::DuplicateChoice {
                event: event.id.clone(),
                choice: choice.id.clone(),
            });
        }
        if let Some(chance) = choice.success_chance {
            if chance > 100 {
                return Err(ValidationError::ChanceOutOfRange {
                    event: event.id.clone(),
                    choice: choice.id.clone(),
                    chance,
                });
            }
        }
        for outcome in choice.outcomes() {
            if let Some(bad) = outcome.schedule.iter().find(|s| s.in_weeks == 0) {
                return Err(ValidationError::ScheduleInPast {
                    event: event.id.clone(),
                    choice: choice.id.clone(),
                    target: bad.event.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Validate an arc definition in isolation.
pub fn validate_arc(arc: &ArcDefinition) -> Result<(), ValidationError> {
    if arc.id.0.trim().is_empty() {
        return Err(ValidationError::BlankId);
    }
    if arc.stages.is_empty() {
        return Err(ValidationError::EmptyStage {
            arc: arc.id.clone(),
            stage: 0,
        });
    }
    if let Some(stage) = arc.stages.iter().position(|s| s.events.is_empty()) {
        return Err(ValidationError::EmptyStage {
            arc: arc.id.clone(),
            stage,
        });
    }
    Ok(())
}
