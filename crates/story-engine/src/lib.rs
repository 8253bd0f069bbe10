#![deny(warnings)]

//! Weekly narrative engine: owns the event queue, world flags and arc
//! progress, and exposes the command/query surface the presentation layer
//! drives one player action at a time.

mod arcs;
mod error;
mod phase;
mod queue;
mod scheduler;
mod store;

pub use arcs::{ArcTracker, ArcUpdate};
pub use error::Rejection;
pub use phase::{FlowStatus, Phase, PhaseError, PhaseTrigger};
pub use queue::{
    CompletedEvent, EnqueueError, EventQueue, LapseReason, LapsedEvent, QueuedEvent, Slot,
};
pub use scheduler::WeekReport;
pub use store::{ChoiceRequest, ChoiceResult, StoryStore, TurnEffects};

use chrono::NaiveDate;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use story_core::{
    ArcId, ArcProgress, Catalog, EngineConfig, EventConsequences, EventId, NpcRoster,
    StateSnapshot, StoryEvent, ValidationError, WorldFlags,
};
use story_rules::{evaluate, seeded_rolls, RollSource, StatDelta};
use store::Turn;
use tracing::{debug, info, warn};

/// The queue as presented: only events that pass their requirements against
/// the snapshot the view was built for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueView {
    pub week: u32,
    pub date: NaiveDate,
    pub phase: Phase,
    pub priority: Option<QueuedEvent>,
    pub optional: Vec<QueuedEvent>,
    /// Queued events left out because they are no longer eligible.
    pub hidden: usize,
}

/// Command/query facade over a content catalog and the engine-owned store.
pub struct StoryEngine<R: RollSource = ChaCha8Rng> {
    catalog: Catalog,
    config: EngineConfig,
    store: StoryStore,
    rolls: R,
    viewing: Option<EventId>,
    started: bool,
}

impl StoryEngine<ChaCha8Rng> {
    /// Engine rolling from a ChaCha8 stream seeded by `config.rng_seed`.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Result<Self, ValidationError> {
        let rolls = seeded_rolls(config.rng_seed);
        Self::with_roll_source(catalog, config, rolls)
    }
}

impl<R: RollSource> StoryEngine<R> {
    pub fn with_roll_source(
        catalog: Catalog,
        config: EngineConfig,
        rolls: R,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        for (source, target) in catalog.dangling_references() {
            warn!(%source, %target, "follow-up references unknown event; it will be dropped");
        }
        info!(
            events = catalog.len(),
            arcs = catalog.arcs().count(),
            capacity = config.optional_capacity,
            "story engine ready"
        );
        Ok(Self {
            store: StoryStore::new(config.optional_capacity),
            catalog,
            config,
            rolls,
            viewing: None,
            started: false,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &StoryStore {
        &self.store
    }

    /// Raw queue state, including events that may have become ineligible.
    pub fn event_queue(&self) -> &EventQueue {
        self.store.queue()
    }

    /// Run week 1's morning briefing.
    pub fn start(&mut self, snapshot: StateSnapshot<'_>) -> Result<WeekReport, Rejection> {
        if self.started {
            return Err(Rejection::AlreadyStarted);
        }
        let Self {
            catalog,
            config,
            store,
            rolls,
            ..
        } = self;
        let week = store.queue().current_week();
        let mut report = WeekReport::new(week, config.week_start(week));
        let mut turn = Turn {
            catalog,
            snapshot,
            config,
            rolls,
        };
        store.open_week(&mut turn, &mut report)?;
        self.started = true;
        info!(week, date = %report.date, "playthrough started");
        Ok(report)
    }

    /// Catalog events whose requirements pass now, regardless of queue state.
    pub fn available_events(&self, snapshot: StateSnapshot<'_>) -> Vec<&StoryEvent> {
        let ctx = snapshot.with_flags(self.store.flags());
        self.catalog
            .events()
            .iter()
            .filter(|e| evaluate(&e.requirements, &ctx).eligible)
            .collect()
    }

    /// Current slots, re-validated against `snapshot`. Never re-selects.
    pub fn queue(&self, snapshot: StateSnapshot<'_>) -> QueueView {
        let q = self.store.queue();
        let visible = |e: &&QueuedEvent| {
            self.catalog
                .event(&e.event_id)
                .map(|ev| self.store.is_eligible(ev, snapshot))
                .unwrap_or(false)
        };
        let priority = q.priority_event().filter(visible).cloned();
        let optional: Vec<QueuedEvent> = q.optional_events().iter().filter(visible).cloned().collect();
        let total = q.optional_events().len() + usize::from(q.priority_event().is_some());
        let shown = optional.len() + usize::from(priority.is_some());
        QueueView {
            week: q.current_week(),
            date: self.config.week_start(q.current_week()),
            phase: q.current_phase(),
            priority,
            optional,
            hidden: total - shown,
        }
    }

    /// Point the "currently viewed" cursor at a queued event.
    pub fn select_event(&mut self, id: &EventId) -> Result<&StoryEvent, Rejection> {
        if !self.store.queue().is_queued(id) {
            return Err(Rejection::NotQueued(id.clone()));
        }
        let event = self
            .catalog
            .event(id)
            .ok_or_else(|| Rejection::UnknownEvent(id.clone()))?;
        self.viewing = Some(id.clone());
        Ok(event)
    }

    pub fn close_event_modal(&mut self) {
        self.viewing = None;
    }

    pub fn viewing(&self) -> Option<&StoryEvent> {
        self.viewing.as_ref().and_then(|id| self.catalog.event(id))
    }

    /// Resolve and commit a choice. On `Err` nothing changed.
    pub fn make_choice(
        &mut self,
        request: &ChoiceRequest,
        snapshot: StateSnapshot<'_>,
    ) -> Result<ChoiceResult, Rejection> {
        let Self {
            catalog,
            config,
            store,
            rolls,
            ..
        } = self;
        let mut turn = Turn {
            catalog,
            snapshot,
            config,
            rolls,
        };
        let result = store.make_choice(&mut turn, request)?;
        if self.viewing.as_ref() == Some(&request.event_id) {
            self.viewing = None;
        }
        Ok(result)
    }

    /// Translate a consequence bundle into the delta for the external store.
    pub fn apply_consequences(
        &self,
        consequences: &EventConsequences,
        npcs: &NpcRoster,
    ) -> StatDelta {
        story_rules::apply_consequences(consequences, npcs)
    }

    /// Out-of-cycle re-selection after a major state change. Queued events
    /// that no longer qualify are withdrawn; free slots are refilled.
    pub fn refresh_event_queue(
        &mut self,
        snapshot: StateSnapshot<'_>,
    ) -> Result<WeekReport, Rejection> {
        let Self {
            catalog,
            config,
            store,
            rolls,
            ..
        } = self;
        let mut turn = Turn {
            catalog,
            snapshot,
            config,
            rolls,
        };
        let report = store.refresh(&mut turn)?;
        debug!(
            withdrawn = report.lapsed.len(),
            added = report.optional.len() + usize::from(report.priority.is_some()),
            "queue refreshed"
        );
        Ok(report)
    }

    /// Close the week without rolling: optional phase to week end.
    pub fn end_week(&mut self) -> Result<WeekReport, Rejection> {
        self.store.end_week(&self.config)
    }

    /// Roll to the next week's morning briefing and select its events.
    /// Refused without any state change while a priority event is pending.
    pub fn advance_week(&mut self, snapshot: StateSnapshot<'_>) -> Result<WeekReport, Rejection> {
        let Self {
            catalog,
            config,
            store,
            rolls,
            ..
        } = self;
        let mut turn = Turn {
            catalog,
            snapshot,
            config,
            rolls,
        };
        let report = store.advance_week(&mut turn)?;
        self.viewing = None;
        Ok(report)
    }

    /// Let a queued optional event go unresolved.
    pub fn dismiss_event(&mut self, id: &EventId) -> Result<LapsedEvent, Rejection> {
        let lapsed = self.store.dismiss(id)?;
        if self.viewing.as_ref() == Some(id) {
            self.viewing = None;
        }
        Ok(lapsed)
    }

    pub fn flow_status(&self) -> FlowStatus {
        let q = self.store.queue();
        FlowStatus {
            phase: q.current_phase(),
            week: q.current_week(),
            date: self.config.week_start(q.current_week()),
            has_pending_priority: q.has_pending_priority(),
        }
    }

    pub fn arc_progress(&self, arc: &ArcId) -> ArcProgress {
        self.store.arcs().progress(arc)
    }

    pub fn completed_events(&self) -> &[CompletedEvent] {
        self.store.queue().completed_events()
    }

    pub fn lapsed_events(&self) -> &[LapsedEvent] {
        self.store.queue().lapsed_events()
    }

    pub fn flags(&self) -> &WorldFlags {
        self.store.flags()
    }
}
