//! The engine's mutable core state: priority slot, optional slots, scheduled
//! activations and the completion/lapse logs.

use crate::phase::{Phase, PhaseError, PhaseTrigger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use story_core::{ChoiceId, EventId, EventKind, Stakes};
use thiserror::Error;

/// An event occupying a queue slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub event_id: EventId,
    pub enqueued_week: u32,
    pub expiry_week: Option<u32>,
    pub stakes: Stakes,
    /// Monotonic enqueue order, the tie-break within equal stakes.
    pub seq: u64,
}

impl QueuedEvent {
    /// Whether the deadline falls on or before `week`.
    pub fn is_due(&self, week: u32) -> bool {
        self.expiry_week.map(|w| w <= week).unwrap_or(false)
    }
}

/// Audit entry for a resolved event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEvent {
    pub event_id: EventId,
    pub choice_id: ChoiceId,
    pub week: u32,
    pub success: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LapseReason {
    /// Deadline passed unresolved.
    Expired,
    /// Optional event dismissed by the player.
    Dismissed,
    /// No longer eligible when the queue was refreshed.
    Withdrawn,
}

/// Audit entry for an event that left the queue without resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapsedEvent {
    pub event_id: EventId,
    pub week: u32,
    pub reason: LapseReason,
}

/// Which slot an event occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Priority,
    Optional,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("priority slot already holds {0}")]
    PrioritySlotTaken(EventId),
    #[error("optional slots are full")]
    OptionalFull,
    #[error("{0} is already queued")]
    AlreadyQueued(EventId),
    #[error("background events are never queued")]
    Background,
}

/// Queue state. Invariants: at most one priority event, at most `capacity`
/// optional events ordered by descending stakes then enqueue order, and the
/// completion log is append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventQueue {
    priority_event: Option<QueuedEvent>,
    optional_events: Vec<QueuedEvent>,
    scheduled_events: BTreeMap<u32, Vec<EventId>>,
    completed_events: Vec<CompletedEvent>,
    lapsed_events: Vec<LapsedEvent>,
    current_week: u32,
    current_phase: Phase,
    capacity: usize,
    next_seq: u64,
}

impl EventQueue {
    /// Empty queue at the morning briefing of week 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            priority_event: None,
            optional_events: Vec::new(),
            scheduled_events: BTreeMap::new(),
            completed_events: Vec::new(),
            lapsed_events: Vec::new(),
            current_week: 1,
            current_phase: Phase::MorningBriefing,
            capacity,
            next_seq: 0,
        }
    }

    pub fn priority_event(&self) -> Option<&QueuedEvent> {
        self.priority_event.as_ref()
    }

    pub fn optional_events(&self) -> &[QueuedEvent] {
        &self.optional_events
    }

    pub fn scheduled_events(&self) -> &BTreeMap<u32, Vec<EventId>> {
        &self.scheduled_events
    }

    pub fn completed_events(&self) -> &[CompletedEvent] {
        &self.completed_events
    }

    pub fn lapsed_events(&self) -> &[LapsedEvent] {
        &self.lapsed_events
    }

    pub fn current_week(&self) -> u32 {
        self.current_week
    }

    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_optional_slots(&self) -> usize {
        self.capacity.saturating_sub(self.optional_events.len())
    }

    /// The priority event if it blocks week advancement. A priority event
    /// whose deadline is the current week does not block; it lapses when the
    /// week closes.
    pub fn pending_priority(&self) -> Option<&QueuedEvent> {
        self.priority_event
            .as_ref()
            .filter(|p| !p.is_due(self.current_week))
    }

    pub fn has_pending_priority(&self) -> bool {
        self.pending_priority().is_some()
    }

    pub fn slot_of(&self, id: &EventId) -> Option<Slot> {
        if self.priority_event.as_ref().map(|p| &p.event_id) == Some(id) {
            return Some(Slot::Priority);
        }
        if self.optional_events.iter().any(|q| &q.event_id == id) {
            return Some(Slot::Optional);
        }
        None
    }

    pub fn is_queued(&self, id: &EventId) -> bool {
        self.slot_of(id).is_some()
    }

    pub fn is_completed(&self, id: &EventId) -> bool {
        self.completed_events.iter().any(|c| &c.event_id == id)
    }

    /// Expired or dismissed events never come back; withdrawn ones may.
    pub fn is_retired(&self, id: &EventId) -> bool {
        self.lapsed_events
            .iter()
            .any(|l| &l.event_id == id && l.reason != LapseReason::Withdrawn)
    }

    /// Insert an event into the slot matching its kind.
    pub fn enqueue(
        &mut self,
        id: EventId,
        kind: EventKind,
        stakes: Stakes,
        expires_in_weeks: Option<u32>,
    ) -> Result<Slot, EnqueueError> {
        if self.is_queued(&id) {
            return Err(EnqueueError::AlreadyQueued(id));
        }
        let queued = QueuedEvent {
            event_id: id,
            enqueued_week: self.current_week,
            expiry_week: expires_in_weeks.map(|w| self.current_week.saturating_add(w)),
            stakes,
            seq: self.next_seq,
        };
        match kind {
            EventKind::Background => Err(EnqueueError::Background),
            EventKind::Priority => {
                if let Some(held) = &self.priority_event {
                    return Err(EnqueueError::PrioritySlotTaken(held.event_id.clone()));
                }
                self.priority_event = Some(queued);
                self.next_seq += 1;
                Ok(Slot::Priority)
            }
            EventKind::Optional => {
                if self.optional_events.len() >= self.capacity {
                    return Err(EnqueueError::OptionalFull);
                }
                let at = self
                    .optional_events
                    .iter()
                    .position(|q| q.stakes < queued.stakes)
                    .unwrap_or(self.optional_events.len());
                self.optional_events.insert(at, queued);
                self.next_seq += 1;
                Ok(Slot::Optional)
            }
        }
    }

    /// Remove an event from whichever slot holds it.
    pub fn take(&mut self, id: &EventId) -> Option<QueuedEvent> {
        if self.priority_event.as_ref().map(|p| &p.event_id) == Some(id) {
            return self.priority_event.take();
        }
        let pos = self.optional_events.iter().position(|q| &q.event_id == id)?;
        Some(self.optional_events.remove(pos))
    }

    pub fn schedule(&mut self, week: u32, id: EventId) {
        self.scheduled_events.entry(week).or_default().push(id);
    }

    /// Remove and return everything scheduled for `week` or earlier.
    pub fn take_scheduled(&mut self, week: u32) -> Vec<EventId> {
        let later = self.scheduled_events.split_off(&(week + 1));
        let due = std::mem::replace(&mut self.scheduled_events, later);
        due.into_values().flatten().collect()
    }

    /// Remove every queued event whose deadline is on or before `week`.
    pub fn take_due(&mut self, week: u32) -> Vec<QueuedEvent> {
        let mut due = Vec::new();
        if self.priority_event.as_ref().map(|p| p.is_due(week)).unwrap_or(false) {
            due.extend(self.priority_event.take());
        }
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .optional_events
            .drain(..)
            .partition(|q| q.is_due(week));
        self.optional_events = kept;
        due.extend(expired);
        due
    }

    pub fn record_completion(&mut self, entry: CompletedEvent) {
        self.completed_events.push(entry);
    }

    pub fn record_lapse(&mut self, entry: LapsedEvent) {
        self.lapsed_events.push(entry);
    }

    /// Apply a phase transition.
    pub fn transition(&mut self, trigger: PhaseTrigger) -> Result<Phase, PhaseError> {
        self.current_phase = self.current_phase.next(trigger)?;
        if trigger == PhaseTrigger::WeekRolled {
            self.current_week += 1;
        }
        Ok(self.current_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> EventId {
        EventId::from(s)
    }

    #[test]
    fn second_priority_is_refused() {
        let mut q = EventQueue::new(5);
        q.enqueue(id("a"), EventKind::Priority, Stakes::High, None).unwrap();
        let err = q
            .enqueue(id("b"), EventKind::Priority, Stakes::Critical, None)
            .unwrap_err();
        assert_eq!(err, EnqueueError::PrioritySlotTaken(id("a")));
        assert_eq!(q.priority_event().unwrap().event_id, id("a"));
    }

    #[test]
    fn optional_ordered_by_stakes_then_enqueue_order() {
        let mut q = EventQueue::new(5);
        q.enqueue(id("low"), EventKind::Optional, Stakes::Low, None).unwrap();
        q.enqueue(id("high1"), EventKind::Optional, Stakes::High, None).unwrap();
        q.enqueue(id("crit"), EventKind::Optional, Stakes::Critical, None).unwrap();
        q.enqueue(id("high2"), EventKind::Optional, Stakes::High, None).unwrap();
        let order: Vec<_> = q.optional_events().iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(order, vec!["crit", "high1", "high2", "low"]);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut q = EventQueue::new(2);
        q.enqueue(id("a"), EventKind::Optional, Stakes::Low, None).unwrap();
        q.enqueue(id("b"), EventKind::Optional, Stakes::Low, None).unwrap();
        assert_eq!(
            q.enqueue(id("c"), EventKind::Optional, Stakes::Critical, None),
            Err(EnqueueError::OptionalFull)
        );
        assert_eq!(
            q.enqueue(id("a"), EventKind::Optional, Stakes::Low, None),
            Err(EnqueueError::AlreadyQueued(id("a")))
        );
    }

    #[test]
    fn due_priority_does_not_block() {
        let mut q = EventQueue::new(5);
        q.enqueue(id("deadline"), EventKind::Priority, Stakes::High, Some(0)).unwrap();
        assert!(q.priority_event().is_some());
        assert!(!q.has_pending_priority());
        let due = q.take_due(1);
        assert_eq!(due.len(), 1);
        assert!(q.priority_event().is_none());
    }

    #[test]
    fn scheduled_events_are_taken_up_to_week() {
        let mut q = EventQueue::new(5);
        q.schedule(2, id("a"));
        q.schedule(3, id("b"));
        q.schedule(5, id("c"));
        assert_eq!(q.take_scheduled(3), vec![id("a"), id("b")]);
        assert_eq!(q.scheduled_events().len(), 1);
    }

    #[test]
    fn week_rolls_only_through_week_end() {
        let mut q = EventQueue::new(5);
        q.transition(PhaseTrigger::QueuePopulated { has_priority: false }).unwrap();
        assert!(q.transition(PhaseTrigger::WeekRolled).is_err());
        assert_eq!(q.current_week(), 1);
        q.transition(PhaseTrigger::CloseWeek).unwrap();
        q.transition(PhaseTrigger::FalloutDone).unwrap();
        q.transition(PhaseTrigger::WeekRolled).unwrap();
        assert_eq!(q.current_week(), 2);
        assert_eq!(q.current_phase(), Phase::MorningBriefing);
    }

    proptest! {
        #[test]
        fn slots_never_overflow(ops in proptest::collection::vec((0u8..3, 0u8..4, 0u8..20), 0..64), cap in 1usize..6) {
            let mut q = EventQueue::new(cap);
            for (kind, stakes, n) in ops {
                let kind = match kind { 0 => EventKind::Priority, 1 => EventKind::Optional, _ => EventKind::Background };
                let stakes = match stakes { 0 => Stakes::Low, 1 => Stakes::Medium, 2 => Stakes::High, _ => Stakes::Critical };
                let ev = EventId(format!("e{n}"));
                if n % 5 == 0 {
                    q.take(&ev);
                } else {
                    let _ = q.enqueue(ev, kind, stakes, None);
                }
                prop_assert!(q.optional_events().len() <= cap);
                let sorted = q.optional_events().windows(2).all(|w| {
                    w[0].stakes > w[1].stakes || (w[0].stakes == w[1].stakes && w[0].seq < w[1].seq)
                });
                prop_assert!(sorted);
            }
        }
    }
}
