//! Weekly selection and the week open/close sequences.
//!
//! Selection order each week: scheduled activations first, then organic
//! candidates in catalog order. Background events resolve on the spot,
//! the priority slot takes the highest-weight eligible priority event,
//! and optional slots fill by stakes.

use crate::error::Rejection;
use crate::phase::{Phase, PhaseTrigger};
use crate::queue::{LapseReason, LapsedEvent};
use crate::store::{StoryStore, Turn, TurnEffects};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use story_core::{Catalog, EngineConfig, EventId, EventKind, StateSnapshot, StoryEvent};
use story_rules::RollSource;
use tracing::{debug, info, warn};

/// What a week transition did.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeekReport {
    /// Week that was closed, if this report covers a close.
    pub closed_week: Option<u32>,
    /// Current week after the command.
    pub week: u32,
    pub date: NaiveDate,
    pub lapsed: Vec<LapsedEvent>,
    /// Scheduled activations taken for this week.
    pub promoted: Vec<EventId>,
    pub priority: Option<EventId>,
    pub optional: Vec<EventId>,
    pub effects: TurnEffects,
}

impl WeekReport {
    pub(crate) fn new(week: u32, date: NaiveDate) -> Self {
        Self {
            closed_week: None,
            week,
            date,
            lapsed: Vec::new(),
            promoted: Vec::new(),
            priority: None,
            optional: Vec::new(),
            effects: TurnEffects::default(),
        }
    }
}

impl StoryStore {
    /// Fill free slots from scheduled and organic candidates.
    pub(crate) fn populate<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
        report: &mut WeekReport,
    ) {
        let catalog = turn.catalog;
        let week = self.queue.current_week();

        let mut candidates: Vec<(&StoryEvent, bool)> = Vec::new();
        for id in self.queue.take_scheduled(week) {
            let Some(event) = catalog.event(&id) else {
                warn!(event = %id, week, "scheduled event missing from catalog; dropping");
                report.effects.dropped.push(id);
                continue;
            };
            report.promoted.push(id);
            if candidates.iter().any(|(c, _)| c.id == event.id) {
                continue;
            }
            if self.is_open(event) {
                candidates.push((event, true));
            } else {
                debug!(event = %event.id, "scheduled event already queued or retired");
            }
        }
        for event in catalog.events() {
            if self.is_open(event) && !candidates.iter().any(|(c, _)| c.id == event.id) {
                candidates.push((event, false));
            }
        }

        let background: Vec<&StoryEvent> = candidates
            .iter()
            .filter(|(e, _)| e.kind == EventKind::Background)
            .map(|(e, _)| *e)
            .collect();
        for event in background {
            // Earlier auto-resolutions may have changed flags.
            if self.queue.is_completed(&event.id) || !self.is_eligible(event, turn.snapshot) {
                continue;
            }
            let chain = self.auto_resolve(turn, event, &mut report.effects);
            self.follow_chain(turn, chain, &mut report.effects);
        }

        let mut priority: Vec<(&StoryEvent, bool)> = candidates
            .iter()
            .copied()
            .filter(|(e, scheduled)| {
                self.selectable(e, *scheduled, EventKind::Priority, turn.snapshot)
            })
            .collect();
        priority.sort_by_key(|(e, _)| {
            (
                Reverse(e.weight),
                e.expires_in_weeks.unwrap_or(u32::MAX),
                catalog.position(&e.id).unwrap_or(usize::MAX),
            )
        });
        let mut rest = priority.into_iter();
        if self.queue.priority_event().is_none() {
            if let Some((winner, _)) = rest.next() {
                match self.queue.enqueue(
                    winner.id.clone(),
                    winner.kind,
                    winner.stakes,
                    winner.expires_in_weeks,
                ) {
                    Ok(_) => report.priority = Some(winner.id.clone()),
                    Err(e) => warn!(event = %winner.id, error = %e, "priority selection failed"),
                }
            }
        }
        for (loser, scheduled) in rest {
            if scheduled {
                info!(event = %loser.id, "priority slot taken; deferring scheduled event");
                self.defer(loser.id.clone(), &mut report.effects);
            }
        }

        let mut optional: Vec<(&StoryEvent, bool)> = candidates
            .iter()
            .copied()
            .filter(|(e, scheduled)| {
                self.selectable(e, *scheduled, EventKind::Optional, turn.snapshot)
            })
            .collect();
        optional.sort_by_key(|(e, _)| {
            (
                Reverse(e.stakes),
                Reverse(e.weight),
                catalog.position(&e.id).unwrap_or(usize::MAX),
            )
        });
        for (event, scheduled) in optional {
            if self.queue.free_optional_slots() == 0 {
                if scheduled {
                    self.defer(event.id.clone(), &mut report.effects);
                }
                continue;
            }
            match self
                .queue
                .enqueue(event.id.clone(), event.kind, event.stakes, event.expires_in_weeks)
            {
                Ok(_) => report.optional.push(event.id.clone()),
                Err(e) => warn!(event = %event.id, error = %e, "optional selection failed"),
            }
        }
        debug!(
            week,
            priority = ?report.priority,
            optional = report.optional.len(),
            "queue populated"
        );
    }

    /// Whether a candidate can take a `kind` slot now. Scheduled candidates
    /// that fail their requirements are dropped here.
    fn selectable(
        &self,
        event: &StoryEvent,
        scheduled: bool,
        kind: EventKind,
        snapshot: StateSnapshot<'_>,
    ) -> bool {
        if event.kind != kind
            || self.queue.is_queued(&event.id)
            || self.queue.is_completed(&event.id)
        {
            return false;
        }
        let eligible = self.is_eligible(event, snapshot);
        if scheduled && !eligible {
            debug!(event = %event.id, "scheduled event not eligible; dropping");
        }
        eligible
    }

    /// Morning briefing: select and move into the week's first phase.
    pub(crate) fn open_week<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
        report: &mut WeekReport,
    ) -> Result<(), Rejection> {
        self.populate(turn, report);
        self.settle_phase()
    }

    /// Optional phase through fallout to week end. Unresolved events whose
    /// deadline has arrived lapse here.
    pub(crate) fn close_week(&mut self, report: &mut WeekReport) -> Result<(), Rejection> {
        if let Some(p) = self.queue.pending_priority() {
            return Err(Rejection::PriorityPending(p.event_id.clone()));
        }
        self.queue.transition(PhaseTrigger::CloseWeek)?;
        let week = self.queue.current_week();
        for q in self.queue.take_due(week) {
            info!(event = %q.event_id, week, "event lapsed unresolved");
            let entry = LapsedEvent {
                event_id: q.event_id,
                week,
                reason: LapseReason::Expired,
            };
            self.queue.record_lapse(entry.clone());
            report.lapsed.push(entry);
        }
        self.queue.transition(PhaseTrigger::FalloutDone)?;
        report.closed_week = Some(week);
        Ok(())
    }

    /// Player-initiated close: optional phase to week end.
    pub(crate) fn end_week(&mut self, config: &EngineConfig) -> Result<WeekReport, Rejection> {
        if let Some(p) = self.queue.pending_priority() {
            return Err(Rejection::PriorityPending(p.event_id.clone()));
        }
        let phase = self.queue.current_phase();
        if phase != Phase::OptionalPhase {
            return Err(Rejection::WrongPhase(phase));
        }
        let week = self.queue.current_week();
        let mut report = WeekReport::new(week, config.week_start(week));
        self.close_week(&mut report)?;
        Ok(report)
    }

    /// Close the current week if needed, roll the calendar and open the next.
    pub(crate) fn advance_week<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
    ) -> Result<WeekReport, Rejection> {
        let withdrawn = self.withdraw_stale_priority(turn.catalog, turn.snapshot);
        if withdrawn.is_some() {
            self.settle_phase()?;
        }
        if let Some(p) = self.queue.pending_priority() {
            info!(event = %p.event_id, "advance refused while priority event pending");
            return Err(Rejection::PriorityPending(p.event_id.clone()));
        }
        let phase = self.queue.current_phase();
        if !phase.accepts_advance() {
            return Err(Rejection::WrongPhase(phase));
        }
        let mut report = WeekReport::new(
            self.queue.current_week(),
            turn.config.week_start(self.queue.current_week()),
        );
        report.lapsed.extend(withdrawn);
        if phase == Phase::OptionalPhase {
            self.close_week(&mut report)?;
        }
        self.queue.transition(PhaseTrigger::WeekRolled)?;
        report.week = self.queue.current_week();
        report.date = turn.config.week_start(report.week);
        self.open_week(turn, &mut report)?;
        info!(
            week = report.week,
            date = %report.date,
            lapsed = report.lapsed.len(),
            "week advanced"
        );
        Ok(report)
    }

    /// Drop queued events that no longer qualify, then re-select.
    pub(crate) fn refresh<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
    ) -> Result<WeekReport, Rejection> {
        let phase = self.queue.current_phase();
        if !phase.accepts_choices() {
            return Err(Rejection::WrongPhase(phase));
        }
        let week = self.queue.current_week();
        let mut report = WeekReport::new(week, turn.config.week_start(week));
        report.lapsed = self.withdraw_ineligible(turn.catalog, turn.snapshot);
        self.populate(turn, &mut report);
        self.settle_phase()?;
        Ok(report)
    }

    fn withdraw_ineligible(
        &mut self,
        catalog: &Catalog,
        snapshot: StateSnapshot<'_>,
    ) -> Vec<LapsedEvent> {
        let week = self.queue.current_week();
        let stale: Vec<EventId> = self
            .queue
            .priority_event()
            .into_iter()
            .chain(self.queue.optional_events())
            .map(|q| &q.event_id)
            .filter(|id| match catalog.event(id) {
                Some(event) => !self.is_eligible(event, snapshot),
                None => true,
            })
            .cloned()
            .collect();
        let mut out = Vec::with_capacity(stale.len());
        for id in stale {
            self.queue.take(&id);
            debug!(event = %id, "withdrawing ineligible event");
            let entry = LapsedEvent {
                event_id: id,
                week,
                reason: LapseReason::Withdrawn,
            };
            self.queue.record_lapse(entry.clone());
            out.push(entry);
        }
        out
    }
}
