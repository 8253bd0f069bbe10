use crate::phase::{Phase, PhaseError};
use story_core::{ChoiceId, EventId};
use thiserror::Error;

/// Recoverable refusal of a player command. None of these halt the week
/// cycle; the caller surfaces the message and carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("priority event pending: resolve {0} first")]
    PriorityPending(EventId),
    #[error("not available during {0:?}")]
    WrongPhase(Phase),
    #[error("the first week has already been started")]
    AlreadyStarted,
    #[error("unknown event {0}")]
    UnknownEvent(EventId),
    #[error("event {0} is not in the queue")]
    NotQueued(EventId),
    #[error("event {event} has no choice {choice}")]
    UnknownChoice { event: EventId, choice: ChoiceId },
    #[error("event {event} is no longer available: {reason}")]
    EventIneligible { event: EventId, reason: String },
    #[error("choice {choice} on {event} is not available: {reason}")]
    ChoiceIneligible {
        event: EventId,
        choice: ChoiceId,
        reason: String,
    },
    #[error("choice {choice} on {event} must be confirmed")]
    ConfirmationRequired { event: EventId, choice: ChoiceId },
    #[error("priority event {0} cannot be dismissed")]
    CannotDismissPriority(EventId),
    #[error(transparent)]
    Phase(#[from] PhaseError),
}
