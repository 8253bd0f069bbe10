//! Authored events, choices, requirements and consequences.

use crate::{ArcId, ChoiceId, EventId, MarketCondition, NpcId, Rank};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How an event occupies the weekly queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Mandatory; blocks week advancement until resolved.
    Priority,
    /// May be resolved, dismissed or left to lapse.
    Optional,
    /// Never queued; auto-resolves with its first eligible choice.
    Background,
}

/// Narrative weight of an event, totally ordered from `Low` to `Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stakes {
    Low,
    Medium,
    High,
    Critical,
}

/// Minimum relationship with a named NPC.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRequirement {
    pub npc: NpcId,
    pub min: i32,
}

/// Conjunction of independently optional clauses. An empty collection or
/// `None` leaves that clause unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRequirements {
    pub min_stats: BTreeMap<String, Decimal>,
    pub max_stats: BTreeMap<String, Decimal>,
    pub required_flags: BTreeSet<String>,
    pub forbidden_flags: BTreeSet<String>,
    pub min_relationships: Vec<RelationshipRequirement>,
    pub min_rank: Option<Rank>,
    /// Allowed market conditions.
    pub market_conditions: BTreeSet<MarketCondition>,
}

impl EventRequirements {
    /// True when no clause is present.
    pub fn is_unconstrained(&self) -> bool {
        self.min_stats.is_empty()
            && self.max_stats.is_empty()
            && self.required_flags.is_empty()
            && self.forbidden_flags.is_empty()
            && self.min_relationships.is_empty()
            && self.min_rank.is_none()
            && self.market_conditions.is_empty()
    }

    pub fn with_min_stat(mut self, stat: impl Into<String>, min: Decimal) -> Self {
        self.min_stats.insert(stat.into(), min);
        self
    }

    pub fn with_max_stat(mut self, stat: impl Into<String>, max: Decimal) -> Self {
        self.max_stats.insert(stat.into(), max);
        self
    }

    pub fn with_required_flag(mut self, flag: impl Into<String>) -> Self {
        self.required_flags.insert(flag.into());
        self
    }

    pub fn with_forbidden_flag(mut self, flag: impl Into<String>) -> Self {
        self.forbidden_flags.insert(flag.into());
        self
    }

    pub fn with_min_relationship(mut self, npc: impl Into<NpcId>, min: i32) -> Self {
        self.min_relationships.push(RelationshipRequirement {
            npc: npc.into(),
            min,
        });
        self
    }

    pub fn with_min_rank(mut self, rank: Rank) -> Self {
        self.min_rank = Some(rank);
        self
    }

    pub fn with_market(mut self, market: MarketCondition) -> Self {
        self.market_conditions.insert(market);
        self
    }
}

/// Probabilistic gate against a named player skill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCheck {
    pub skill: String,
    pub threshold: i32,
}

/// Toast severity for the presentation layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Danger,
}

/// Notification payload surfaced after a consequence applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

/// Follow-up event activated a number of weeks after the current one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledFollowUp {
    pub event: EventId,
    /// Weeks from the resolving week; must be >= 1.
    pub in_weeks: u32,
}

/// Declarative effect bundle attached to a choice outcome.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConsequences {
    pub stat_deltas: BTreeMap<String, Decimal>,
    pub relationship_deltas: BTreeMap<NpcId, i32>,
    pub trust_deltas: BTreeMap<NpcId, i32>,
    pub add_flags: BTreeSet<String>,
    pub remove_flags: BTreeSet<String>,
    /// Advance the arc the resolving event belongs to.
    pub advance_arc: bool,
    /// Force the named arc into `Failed`.
    pub fail_arc: Option<ArcId>,
    /// Follow-up injected into the queue within the same turn.
    pub chain_event: Option<EventId>,
    pub schedule: Vec<ScheduledFollowUp>,
    pub notification: Option<Notification>,
}

impl EventConsequences {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_stat(mut self, stat: impl Into<String>, delta: Decimal) -> Self {
        self.stat_deltas.insert(stat.into(), delta);
        self
    }

    pub fn with_relationship(mut self, npc: impl Into<NpcId>, delta: i32) -> Self {
        self.relationship_deltas.insert(npc.into(), delta);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.add_flags.insert(flag.into());
        self
    }

    pub fn with_chain(mut self, event: impl Into<EventId>) -> Self {
        self.chain_event = Some(event.into());
        self
    }

    pub fn advancing_arc(mut self) -> Self {
        self.advance_arc = true;
        self
    }
}

/// One option the player may take on an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventChoice {
    pub id: ChoiceId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Checked at choice time, not at enqueue time.
    #[serde(default)]
    pub requirements: EventRequirements,
    #[serde(default)]
    pub skill_check: Option<SkillCheck>,
    /// Flat chance in percent; wins over `skill_check` when both are set.
    #[serde(default)]
    pub success_chance: Option<u8>,
    #[serde(default)]
    pub on_success: EventConsequences,
    /// Falls back to `on_success` when absent.
    #[serde(default)]
    pub on_failure: Option<EventConsequences>,
    /// Enhanced variant selected on a critical skill roll.
    #[serde(default)]
    pub on_critical_success: Option<EventConsequences>,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl EventChoice {
    pub fn new(id: impl Into<ChoiceId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: String::new(),
            requirements: EventRequirements::default(),
            skill_check: None,
            success_chance: None,
            on_success: EventConsequences::default(),
            on_failure: None,
            on_critical_success: None,
            requires_confirmation: false,
        }
    }

    pub fn with_requirements(mut self, requirements: EventRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_success(mut self, consequences: EventConsequences) -> Self {
        self.on_success = consequences;
        self
    }

    pub fn with_failure(mut self, consequences: EventConsequences) -> Self {
        self.on_failure = Some(consequences);
        self
    }

    pub fn with_skill_check(mut self, skill: impl Into<String>, threshold: i32) -> Self {
        self.skill_check = Some(SkillCheck {
            skill: skill.into(),
            threshold,
        });
        self
    }

    pub fn with_success_chance(mut self, chance: u8) -> Self {
        self.success_chance = Some(chance);
        self
    }

    /// Consequences applied when the choice fails.
    pub fn failure_consequences(&self) -> &EventConsequences {
        self.on_failure.as_ref().unwrap_or(&self.on_success)
    }

    /// True when resolution never draws a random number.
    pub fn is_deterministic(&self) -> bool {
        self.skill_check.is_none() && self.success_chance.is_none()
    }

    /// Every consequence bundle this choice can produce.
    pub fn outcomes(&self) -> impl Iterator<Item = &EventConsequences> {
        std::iter::once(&self.on_success)
            .chain(self.on_failure.iter())
            .chain(self.on_critical_success.iter())
    }
}

/// Membership of an event in an arc stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcRef {
    pub arc: ArcId,
    pub stage: usize,
}

/// An authored narrative event. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoryEvent {
    pub id: EventId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: EventKind,
    pub stakes: Stakes,
    #[serde(default)]
    pub category: String,
    /// Explicit priority weight; higher wins slot selection.
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub requirements: EventRequirements,
    pub choices: Vec<EventChoice>,
    /// Additional week rolls the event survives once queued.
    #[serde(default)]
    pub expires_in_weeks: Option<u32>,
    #[serde(default)]
    pub source_npc: Option<NpcId>,
    #[serde(default)]
    pub arc: Option<ArcRef>,
}

impl StoryEvent {
    pub fn new(
        id: impl Into<EventId>,
        title: impl Into<String>,
        kind: EventKind,
        stakes: Stakes,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            kind,
            stakes,
            category: String::new(),
            weight: 0,
            requirements: EventRequirements::default(),
            choices: Vec::new(),
            expires_in_weeks: None,
            source_npc: None,
            arc: None,
        }
    }

    pub fn with_choice(mut self, choice: EventChoice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_requirements(mut self, requirements: EventRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_expiry(mut self, weeks: u32) -> Self {
        self.expires_in_weeks = Some(weeks);
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_source_npc(mut self, npc: impl Into<NpcId>) -> Self {
        self.source_npc = Some(npc.into());
        self
    }

    pub fn with_arc(mut self, arc: impl Into<ArcId>, stage: usize) -> Self {
        self.arc = Some(ArcRef {
            arc: arc.into(),
            stage,
        });
        self
    }

    pub fn choice(&self, id: &ChoiceId) -> Option<&EventChoice> {
        self.choices.iter().find(|c| &c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stakes_are_ordered() {
        assert!(Stakes::Low < Stakes::Medium);
        assert!(Stakes::High < Stakes::Critical);
        let mut v = vec![Stakes::High, Stakes::Low, Stakes::Critical];
        v.sort();
        assert_eq!(v, vec![Stakes::Low, Stakes::High, Stakes::Critical]);
    }

    #[test]
    fn failure_falls_back_to_success() {
        let gain = EventConsequences::default().with_stat("reputation", Decimal::new(5, 0));
        let choice = EventChoice::new("c", "C").with_success(gain.clone());
        assert_eq!(choice.failure_consequences(), &gain);
        let loss = EventConsequences::default().with_stat("reputation", Decimal::new(-5, 0));
        let choice = choice.with_failure(loss.clone());
        assert_eq!(choice.failure_consequences(), &loss);
        assert_eq!(choice.outcomes().count(), 2);
    }

    #[test]
    fn empty_requirements_are_unconstrained() {
        assert!(EventRequirements::default().is_unconstrained());
        assert!(!EventRequirements::default()
            .with_required_flag("MET_SARAH")
            .is_unconstrained());
    }

    #[test]
    fn yaml_style_kinds_deserialize() {
        let k: EventKind = serde_json::from_str("\"PRIORITY\"").unwrap();
        assert_eq!(k, EventKind::Priority);
        let s: Stakes = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(s, Stakes::Critical);
    }
}
