//! Translation of consequence payloads into the `StatDelta` envelope.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use story_core::{ArcId, EventConsequences, Notification, NpcId, NpcRoster};
use tracing::warn;

/// Generic delta envelope understood by the external player-state store.
/// The caller commits it atomically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatDelta {
    pub stats: BTreeMap<String, Decimal>,
    pub relationships: BTreeMap<NpcId, i32>,
    pub trust: BTreeMap<NpcId, i32>,
    pub add_flags: BTreeSet<String>,
    pub remove_flags: BTreeSet<String>,
    pub arc_advance: bool,
    pub failed_arcs: BTreeSet<ArcId>,
    pub notifications: Vec<Notification>,
}

impl StatDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Summed delta for a stat; zero when untouched.
    pub fn stat(&self, key: &str) -> Decimal {
        self.stats.get(key).copied().unwrap_or(Decimal::ZERO)
    }

    /// Fold `other` into `self`. Numeric deltas are summed, never overwritten;
    /// a later flag removal cancels an earlier add of the same flag (and vice
    /// versa); notifications are appended in order.
    pub fn merge(&mut self, other: StatDelta) {
        for (k, v) in other.stats {
            *self.stats.entry(k).or_insert(Decimal::ZERO) += v;
        }
        for (npc, v) in other.relationships {
            let e = self.relationships.entry(npc).or_insert(0);
            *e = e.saturating_add(v);
        }
        for (npc, v) in other.trust {
            let e = self.trust.entry(npc).or_insert(0);
            *e = e.saturating_add(v);
        }
        for f in other.add_flags {
            self.remove_flags.remove(&f);
            self.add_flags.insert(f);
        }
        for f in other.remove_flags {
            self.add_flags.remove(&f);
            self.remove_flags.insert(f);
        }
        self.arc_advance |= other.arc_advance;
        self.failed_arcs.extend(other.failed_arcs);
        self.notifications.extend(other.notifications);
    }
}

/// Map a consequence payload to a `StatDelta`.
///
/// Malformed sub-effects are dropped and logged while the rest of the bundle
/// still applies. Dropped: zero deltas, relationship or trust deltas for NPCs
/// missing from `npcs`, blank flag tokens, and flags named in both the add
/// and remove sets.
pub fn apply_consequences(consequences: &EventConsequences, npcs: &NpcRoster) -> StatDelta {
    let mut delta = StatDelta::default();
    for (stat, v) in &consequences.stat_deltas {
        if stat.trim().is_empty() {
            warn!(delta = %v, "dropping stat delta with blank stat name");
            continue;
        }
        if v.is_zero() {
            warn!(%stat, "dropping zero stat delta");
            continue;
        }
        delta.stats.insert(stat.clone(), *v);
    }
    for (npc, v) in &consequences.relationship_deltas {
        if *v == 0 {
            warn!(%npc, "dropping zero relationship delta");
        } else if npcs.contains_key(npc) {
            delta.relationships.insert(npc.clone(), *v);
        } else {
            warn!(%npc, delta = v, "dropping relationship delta for unknown npc");
        }
    }
    for (npc, v) in &consequences.trust_deltas {
        if *v == 0 {
            warn!(%npc, "dropping zero trust delta");
        } else if npcs.contains_key(npc) {
            delta.trust.insert(npc.clone(), *v);
        } else {
            warn!(%npc, delta = v, "dropping trust delta for unknown npc");
        }
    }
    for f in &consequences.add_flags {
        if f.trim().is_empty() {
            warn!("dropping blank flag token");
        } else if consequences.remove_flags.contains(f) {
            warn!(flag = %f, "flag both added and removed; dropping both");
        } else {
            delta.add_flags.insert(f.clone());
        }
    }
    for f in &consequences.remove_flags {
        if f.trim().is_empty() {
            warn!("dropping blank flag token");
        } else if !consequences.add_flags.contains(f) {
            delta.remove_flags.insert(f.clone());
        }
    }
    delta.arc_advance = consequences.advance_arc;
    if let Some(arc) = &consequences.fail_arc {
        delta.failed_arcs.insert(arc.clone());
    }
    if let Some(n) = &consequences.notification {
        delta.notifications.push(n.clone());
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_core::{NpcState, Severity};

    fn roster() -> NpcRoster {
        let mut npcs = NpcRoster::new();
        npcs.insert(NpcId::from("sarah"), NpcState::default());
        npcs
    }

    #[test]
    fn translates_every_effect() {
        let mut c = EventConsequences::default()
            .with_stat("cash", Decimal::new(-50_000, 0))
            .with_relationship("sarah", 5)
            .with_flag("MET_SARAH")
            .advancing_arc();
        c.trust_deltas.insert(NpcId::from("sarah"), -2);
        c.remove_flags.insert("ROOKIE".into());
        c.fail_arc = Some(ArcId::from("hostile_bid"));
        c.notification = Some(Notification {
            title: "Deal signed".into(),
            message: "The board approved.".into(),
            severity: Severity::Success,
        });
        let d = apply_consequences(&c, &roster());
        assert_eq!(d.stat("cash"), Decimal::new(-50_000, 0));
        assert_eq!(d.relationships[&NpcId::from("sarah")], 5);
        assert_eq!(d.trust[&NpcId::from("sarah")], -2);
        assert!(d.add_flags.contains("MET_SARAH"));
        assert!(d.remove_flags.contains("ROOKIE"));
        assert!(d.arc_advance);
        assert!(d.failed_arcs.contains(&ArcId::from("hostile_bid")));
        assert_eq!(d.notifications.len(), 1);
    }

    #[test]
    fn unknown_npc_drops_only_that_effect() {
        let c = EventConsequences::default()
            .with_stat("reputation", Decimal::new(3, 0))
            .with_relationship("ghost", 10)
            .with_relationship("sarah", 1);
        let d = apply_consequences(&c, &roster());
        assert_eq!(d.stat("reputation"), Decimal::new(3, 0));
        assert!(!d.relationships.contains_key(&NpcId::from("ghost")));
        assert_eq!(d.relationships[&NpcId::from("sarah")], 1);
    }

    #[test]
    fn contradictory_and_blank_flags_are_dropped() {
        let mut c = EventConsequences::default().with_flag("X").with_flag("  ").with_flag("Y");
        c.remove_flags.insert("X".into());
        let d = apply_consequences(&c, &NpcRoster::new());
        assert_eq!(d.add_flags.iter().collect::<Vec<_>>(), vec!["Y"]);
        assert!(d.remove_flags.is_empty());
    }

    #[test]
    fn zero_deltas_and_blank_removals_are_dropped() {
        let mut c = EventConsequences::default()
            .with_stat("cash", Decimal::ZERO)
            .with_stat("stress", Decimal::new(2, 0))
            .with_relationship("sarah", 0);
        c.trust_deltas.insert(NpcId::from("sarah"), 0);
        c.remove_flags.insert(" ".into());
        c.remove_flags.insert("ROOKIE".into());
        let d = apply_consequences(&c, &roster());
        assert!(!d.stats.contains_key("cash"));
        assert_eq!(d.stat("stress"), Decimal::new(2, 0));
        assert!(d.relationships.is_empty());
        assert!(d.trust.is_empty());
        assert_eq!(d.remove_flags.iter().collect::<Vec<_>>(), vec!["ROOKIE"]);
    }

    #[test]
    fn merge_sums_instead_of_overwriting() {
        let npcs = roster();
        let mut total = apply_consequences(
            &EventConsequences::default()
                .with_stat("cash", Decimal::new(100, 0))
                .with_relationship("sarah", 2),
            &npcs,
        );
        total.merge(apply_consequences(
            &EventConsequences::default()
                .with_stat("cash", Decimal::new(250, 0))
                .with_stat("stress", Decimal::new(4, 0))
                .with_relationship("sarah", 3),
            &npcs,
        ));
        assert_eq!(total.stat("cash"), Decimal::new(350, 0));
        assert_eq!(total.stat("stress"), Decimal::new(4, 0));
        assert_eq!(total.relationships[&NpcId::from("sarah")], 5);
    }

    #[test]
    fn merge_orders_flag_changes() {
        let mut first = StatDelta::default();
        first.add_flags.insert("LEAK".into());
        let mut second = StatDelta::default();
        second.remove_flags.insert("LEAK".into());
        first.merge(second);
        assert!(first.add_flags.is_empty());
        assert!(first.remove_flags.contains("LEAK"));
    }
}
