//! Phase state machine for a week's narrative beats.
//!
//! ```text
//! MORNING_BRIEFING -> PRIORITY_EVENT -> OPTIONAL_PHASE -> FALLOUT -> WEEK_END
//!        ^                                                             |
//!        +--------------------------- week + 1 ------------------------+
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    MorningBriefing,
    PriorityEvent,
    OptionalPhase,
    Fallout,
    WeekEnd,
}

/// Inputs that move the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseTrigger {
    /// The scheduler filled (or re-filled) the queue.
    QueuePopulated { has_priority: bool },
    /// The blocking priority event was resolved or withdrawn.
    PriorityResolved,
    /// The player closed the week.
    CloseWeek,
    /// Fallout bookkeeping for the closing week finished.
    FalloutDone,
    /// The calendar moved to the next week.
    WeekRolled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{trigger:?} is not valid during {phase:?}")]
pub struct PhaseError {
    pub phase: Phase,
    pub trigger: PhaseTrigger,
}

impl Phase {
    /// Next phase for `trigger`, or an error for an invalid transition.
    pub fn next(self, trigger: PhaseTrigger) -> Result<Phase, PhaseError> {
        use Phase::*;
        use PhaseTrigger::*;
        let next = match (self, trigger) {
            (MorningBriefing | PriorityEvent | OptionalPhase, QueuePopulated { has_priority }) => {
                if has_priority {
                    PriorityEvent
                } else {
                    OptionalPhase
                }
            }
            (PriorityEvent, PriorityResolved) => OptionalPhase,
            (OptionalPhase, CloseWeek) => Fallout,
            (Fallout, FalloutDone) => WeekEnd,
            (WeekEnd, WeekRolled) => MorningBriefing,
            (phase, trigger) => return Err(PhaseError { phase, trigger }),
        };
        Ok(next)
    }

    /// Phases in which the player may ask to advance the week.
    pub fn accepts_advance(self) -> bool {
        matches!(self, Phase::OptionalPhase | Phase::WeekEnd)
    }

    /// Phases in which queued events may be resolved or dismissed.
    pub fn accepts_choices(self) -> bool {
        matches!(self, Phase::PriorityEvent | Phase::OptionalPhase)
    }
}

/// Summary of where the week stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatus {
    pub phase: Phase,
    pub week: u32,
    pub date: NaiveDate,
    pub has_pending_priority: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_week_cycle() {
        let mut p = Phase::default();
        for trigger in [
            PhaseTrigger::QueuePopulated { has_priority: true },
            PhaseTrigger::PriorityResolved,
            PhaseTrigger::CloseWeek,
            PhaseTrigger::FalloutDone,
            PhaseTrigger::WeekRolled,
        ] {
            p = p.next(trigger).unwrap();
        }
        assert_eq!(p, Phase::MorningBriefing);
    }

    #[test]
    fn no_priority_goes_straight_to_optional() {
        let p = Phase::MorningBriefing
            .next(PhaseTrigger::QueuePopulated { has_priority: false })
            .unwrap();
        assert_eq!(p, Phase::OptionalPhase);
    }

    #[test]
    fn closing_is_refused_while_priority_phase() {
        let err = Phase::PriorityEvent.next(PhaseTrigger::CloseWeek).unwrap_err();
        assert_eq!(err.phase, Phase::PriorityEvent);
        assert!(!Phase::PriorityEvent.accepts_advance());
        assert!(Phase::WeekEnd.accepts_advance());
    }

    #[test]
    fn chained_priority_reenters_priority_phase() {
        let p = Phase::OptionalPhase
            .next(PhaseTrigger::QueuePopulated { has_priority: true })
            .unwrap();
        assert_eq!(p, Phase::PriorityEvent);
    }

    #[test]
    fn week_end_cannot_skip_roll() {
        assert!(Phase::WeekEnd
            .next(PhaseTrigger::QueuePopulated { has_priority: false })
            .is_err());
        assert!(Phase::Fallout.next(PhaseTrigger::WeekRolled).is_err());
    }
}
