//! The owned narrative store and the resolve/commit/chain path shared by
//! player choices and background auto-resolution.

use crate::arcs::{ArcTracker, ArcUpdate};
use crate::error::Rejection;
use crate::phase::{Phase, PhaseTrigger};
use crate::queue::{CompletedEvent, EventQueue, LapseReason, LapsedEvent, Slot};
use serde::{Deserialize, Serialize};
use story_core::{Catalog, ChoiceId, EngineConfig, EventId, EventKind, StateSnapshot, StoryEvent, WorldFlags};
use story_rules::{apply_consequences, evaluate, ChoiceResolver, Resolution, RollSource, StatDelta};
use tracing::{debug, info, warn};

/// Collaborators lent to a command that may resolve events.
pub(crate) struct Turn<'a, R: RollSource + ?Sized> {
    pub catalog: &'a Catalog,
    pub snapshot: StateSnapshot<'a>,
    pub config: &'a EngineConfig,
    pub rolls: &'a mut R,
}

/// Everything one command changed, with deltas already summed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnEffects {
    pub delta: StatDelta,
    pub arc_updates: Vec<ArcUpdate>,
    /// Follow-ups injected into a queue slot this turn.
    pub chained: Vec<EventId>,
    /// Background events resolved without player input.
    pub auto_resolved: Vec<CompletedEvent>,
    /// Events pushed to the following week's selection.
    pub deferred: Vec<EventId>,
    /// Dangling or unusable references that were dropped.
    pub dropped: Vec<EventId>,
    /// Queued events pulled because they stopped qualifying.
    pub withdrawn: Vec<LapsedEvent>,
}

/// A player's pick on a queued event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRequest {
    pub event_id: EventId,
    pub choice_id: ChoiceId,
    /// Required for choices flagged `requires_confirmation`.
    #[serde(default)]
    pub confirmed: bool,
}

impl ChoiceRequest {
    pub fn new(event: impl Into<EventId>, choice: impl Into<ChoiceId>) -> Self {
        Self {
            event_id: event.into(),
            choice_id: choice.into(),
            confirmed: false,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

/// Outcome of a committed choice, for display and for forwarding
/// `effects.delta` to the player-state store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceResult {
    pub event_id: EventId,
    pub choice_id: ChoiceId,
    pub week: u32,
    pub resolution: Resolution,
    pub effects: TurnEffects,
}

/// Queue, world flags and arc progress: the state this engine exclusively
/// owns and mutates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoryStore {
    pub(crate) queue: EventQueue,
    pub(crate) flags: WorldFlags,
    pub(crate) arcs: ArcTracker,
}

impl StoryStore {
    pub fn new(optional_capacity: usize) -> Self {
        Self {
            queue: EventQueue::new(optional_capacity),
            flags: WorldFlags::new(),
            arcs: ArcTracker::new(),
        }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn flags(&self) -> &WorldFlags {
        &self.flags
    }

    pub fn arcs(&self) -> &ArcTracker {
        &self.arcs
    }

    /// Not queued, not resolved, not retired, and admitted by its arc.
    pub(crate) fn is_open(&self, event: &StoryEvent) -> bool {
        !self.queue.is_queued(&event.id)
            && !self.queue.is_completed(&event.id)
            && !self.queue.is_retired(&event.id)
            && event.arc.as_ref().map(|r| self.arcs.admits(r)).unwrap_or(true)
    }

    pub(crate) fn is_eligible(&self, event: &StoryEvent, snapshot: StateSnapshot<'_>) -> bool {
        evaluate(&event.requirements, &snapshot.with_flags(&self.flags)).eligible
    }

    /// Push `id` to next week's selection.
    pub(crate) fn defer(&mut self, id: EventId, effects: &mut TurnEffects) {
        let week = self.queue.current_week() + 1;
        self.queue.schedule(week, id.clone());
        effects.deferred.push(id);
    }

    /// Resolve and commit a player's choice as one unit: validation first,
    /// then resolution, flags, arcs, audit log, follow-ups and phase.
    pub(crate) fn make_choice<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
        request: &ChoiceRequest,
    ) -> Result<ChoiceResult, Rejection> {
        let catalog = turn.catalog;
        let phase = self.queue.current_phase();
        if !phase.accepts_choices() {
            return Err(Rejection::WrongPhase(phase));
        }
        let event = catalog
            .event(&request.event_id)
            .ok_or_else(|| Rejection::UnknownEvent(request.event_id.clone()))?;
        let slot = self
            .queue
            .slot_of(&event.id)
            .ok_or_else(|| Rejection::NotQueued(event.id.clone()))?;
        let mut stale_priority = false;
        if slot == Slot::Optional {
            if let Some(p) = self.queue.pending_priority() {
                let playable = catalog
                    .event(&p.event_id)
                    .map(|ev| self.is_eligible(ev, turn.snapshot))
                    .unwrap_or(false);
                if playable {
                    return Err(Rejection::PriorityPending(p.event_id.clone()));
                }
                stale_priority = true;
            }
        }
        let choice = event
            .choice(&request.choice_id)
            .ok_or_else(|| Rejection::UnknownChoice {
                event: event.id.clone(),
                choice: request.choice_id.clone(),
            })?;
        {
            let ctx = turn.snapshot.with_flags(&self.flags);
            let e = evaluate(&event.requirements, &ctx);
            if !e.eligible {
                return Err(Rejection::EventIneligible {
                    event: event.id.clone(),
                    reason: e.reason.unwrap_or_default(),
                });
            }
            let c = evaluate(&choice.requirements, &ctx);
            if !c.eligible {
                return Err(Rejection::ChoiceIneligible {
                    event: event.id.clone(),
                    choice: choice.id.clone(),
                    reason: c.reason.unwrap_or_default(),
                });
            }
        }
        if choice.requires_confirmation && !request.confirmed {
            return Err(Rejection::ConfirmationRequired {
                event: event.id.clone(),
                choice: choice.id.clone(),
            });
        }

        let mut effects = TurnEffects::default();
        if stale_priority {
            effects
                .withdrawn
                .extend(self.withdraw_stale_priority(catalog, turn.snapshot));
        }
        let resolution = ChoiceResolver::new(turn.config.critical_band).resolve(
            choice,
            turn.snapshot.player,
            &mut *turn.rolls,
        );
        self.queue.take(&event.id);
        let chain = self.commit(turn, event, &choice.id, &resolution, &mut effects);
        self.follow_chain(turn, chain, &mut effects);
        if slot == Slot::Priority && self.queue.current_phase() == Phase::PriorityEvent {
            self.queue.transition(PhaseTrigger::PriorityResolved)?;
        }
        self.settle_phase()?;
        info!(
            event = %event.id,
            choice = %choice.id,
            success = resolution.success,
            chained = effects.chained.len(),
            "choice committed"
        );
        Ok(ChoiceResult {
            event_id: event.id.clone(),
            choice_id: choice.id.clone(),
            week: self.queue.current_week(),
            resolution,
            effects,
        })
    }

    /// Apply a resolution to engine-owned state and fold its delta into
    /// `effects`. Returns the immediate follow-up, if any.
    pub(crate) fn commit<R: RollSource + ?Sized>(
        &mut self,
        turn: &Turn<'_, R>,
        event: &StoryEvent,
        choice: &ChoiceId,
        resolution: &Resolution,
        effects: &mut TurnEffects,
    ) -> Option<EventId> {
        let week = self.queue.current_week();
        let delta = apply_consequences(&resolution.consequences, turn.snapshot.npcs);
        for f in &delta.add_flags {
            self.flags.insert(f.clone());
        }
        for f in &delta.remove_flags {
            self.flags.remove(f);
        }
        if delta.arc_advance {
            match &event.arc {
                Some(r) => match turn.catalog.arc(&r.arc) {
                    Some(def) => effects.arc_updates.extend(self.arcs.advance(def, &event.id)),
                    None => warn!(event = %event.id, arc = %r.arc, "arc advance names unknown arc"),
                },
                None => debug!(event = %event.id, "arc advance on event outside any arc"),
            }
        }
        for arc in &delta.failed_arcs {
            if turn.catalog.arc(arc).is_some() {
                effects.arc_updates.extend(self.arcs.fail(arc));
            } else {
                warn!(%arc, "dropping failure of unknown arc");
            }
        }
        for s in &resolution.consequences.schedule {
            if turn.catalog.event(&s.event).is_some() {
                self.queue.schedule(week + s.in_weeks.max(1), s.event.clone());
            } else {
                warn!(source = %event.id, target = %s.event, "scheduled follow-up missing from catalog; dropping");
                effects.dropped.push(s.event.clone());
            }
        }
        self.queue.record_completion(CompletedEvent {
            event_id: event.id.clone(),
            choice_id: choice.clone(),
            week,
            success: resolution.success,
        });
        effects.delta.merge(delta);
        resolution.consequences.chain_event.clone()
    }

    /// Resolve a background event with its first eligible choice.
    pub(crate) fn auto_resolve<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
        event: &StoryEvent,
        effects: &mut TurnEffects,
    ) -> Option<EventId> {
        let choice = {
            let ctx = turn.snapshot.with_flags(&self.flags);
            event
                .choices
                .iter()
                .find(|c| evaluate(&c.requirements, &ctx).eligible)
        };
        let Some(choice) = choice else {
            debug!(event = %event.id, "background event has no eligible choice");
            return None;
        };
        let resolution = ChoiceResolver::new(turn.config.critical_band).resolve(
            choice,
            turn.snapshot.player,
            &mut *turn.rolls,
        );
        let chain = self.commit(turn, event, &choice.id, &resolution, effects);
        effects.auto_resolved.push(CompletedEvent {
            event_id: event.id.clone(),
            choice_id: choice.id.clone(),
            week: self.queue.current_week(),
            success: resolution.success,
        });
        debug!(event = %event.id, choice = %choice.id, "background event auto-resolved");
        chain
    }

    /// Inject a chain of immediate follow-ups. Background follow-ups resolve
    /// on the spot and may chain further; others take a slot or are deferred
    /// to next week. Dangling ids are logged and dropped.
    pub(crate) fn follow_chain<R: RollSource + ?Sized>(
        &mut self,
        turn: &mut Turn<'_, R>,
        first: Option<EventId>,
        effects: &mut TurnEffects,
    ) {
        let catalog = turn.catalog;
        let mut next = first;
        let mut depth = 0;
        while let Some(id) = next.take() {
            depth += 1;
            if depth > turn.config.max_chain_depth {
                warn!(event = %id, depth, "chain too deep; dropping follow-up");
                effects.dropped.push(id);
                break;
            }
            let Some(event) = catalog.event(&id) else {
                warn!(event = %id, "chained event missing from catalog; dropping");
                effects.dropped.push(id);
                continue;
            };
            if self.queue.is_queued(&id)
                || self.queue.is_completed(&id)
                || self.queue.is_retired(&id)
            {
                debug!(event = %id, "chained event already queued, resolved or retired");
                continue;
            }
            if !self.is_eligible(event, turn.snapshot) {
                debug!(event = %id, "chained event not eligible yet; deferring");
                self.defer(id, effects);
                continue;
            }
            match event.kind {
                EventKind::Background => {
                    next = self.auto_resolve(turn, event, effects);
                }
                kind => match self
                    .queue
                    .enqueue(id.clone(), kind, event.stakes, event.expires_in_weeks)
                {
                    Ok(slot) => {
                        info!(event = %id, ?slot, "chained event injected");
                        effects.chained.push(id);
                    }
                    Err(e) => {
                        warn!(event = %id, error = %e, "chained event deferred to next week");
                        self.defer(id, effects);
                    }
                },
            }
        }
    }

    /// Pull the queued priority event if it no longer passes its
    /// requirements against `snapshot`.
    pub(crate) fn withdraw_stale_priority(
        &mut self,
        catalog: &Catalog,
        snapshot: StateSnapshot<'_>,
    ) -> Option<LapsedEvent> {
        let id = self.queue.pending_priority()?.event_id.clone();
        let eligible = catalog
            .event(&id)
            .map(|ev| self.is_eligible(ev, snapshot))
            .unwrap_or(false);
        if eligible {
            return None;
        }
        self.queue.take(&id);
        info!(event = %id, "priority event no longer eligible; withdrawing");
        let entry = LapsedEvent {
            event_id: id,
            week: self.queue.current_week(),
            reason: LapseReason::Withdrawn,
        };
        self.queue.record_lapse(entry.clone());
        Some(entry)
    }

    /// Player dismissal of an optional event.
    pub(crate) fn dismiss(&mut self, id: &EventId) -> Result<LapsedEvent, Rejection> {
        let phase = self.queue.current_phase();
        if !phase.accepts_choices() {
            return Err(Rejection::WrongPhase(phase));
        }
        match self.queue.slot_of(id) {
            None => Err(Rejection::NotQueued(id.clone())),
            Some(Slot::Priority) => Err(Rejection::CannotDismissPriority(id.clone())),
            Some(Slot::Optional) => {
                self.queue.take(id);
                let entry = LapsedEvent {
                    event_id: id.clone(),
                    week: self.queue.current_week(),
                    reason: LapseReason::Dismissed,
                };
                self.queue.record_lapse(entry.clone());
                info!(event = %id, "optional event dismissed");
                Ok(entry)
            }
        }
    }

    /// Bring the phase in line with the priority slot after the queue changed.
    pub(crate) fn settle_phase(&mut self) -> Result<(), Rejection> {
        let pending = self.queue.has_pending_priority();
        match (self.queue.current_phase(), pending) {
            (Phase::PriorityEvent, false) => {
                self.queue.transition(PhaseTrigger::PriorityResolved)?;
            }
            (Phase::MorningBriefing, _) | (Phase::OptionalPhase, true) => {
                self.queue.transition(PhaseTrigger::QueuePopulated {
                    has_priority: pending,
                })?;
            }
            _ => {}
        }
        Ok(())
    }
}
