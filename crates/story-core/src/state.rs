//! Read-only views of player, NPC and world state fed in by the caller, plus
//! the engine-owned world flag set.

use crate::NpcId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Career rank of the player, ordered from junior to senior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rank {
    #[default]
    Analyst,
    Associate,
    VicePresident,
    Principal,
    Partner,
    ManagingPartner,
}

/// Current market/world condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCondition {
    Bull,
    #[default]
    Normal,
    Bear,
    Crisis,
}

/// Persistent opaque tokens unlocking or blocking content. Additive unless a
/// consequence explicitly removes a flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldFlags(BTreeSet<String>);

impl WorldFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    /// Returns true if the flag was newly set.
    pub fn insert(&mut self, flag: impl Into<String>) -> bool {
        self.0.insert(flag.into())
    }

    /// Returns true if the flag was present.
    pub fn remove(&mut self, flag: &str) -> bool {
        self.0.remove(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for WorldFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Relationship and trust an NPC holds toward the player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcState {
    pub relationship: i32,
    pub trust: i32,
}

/// NPC states keyed by id, owned by the external store.
pub type NpcRoster = BTreeMap<NpcId, NpcState>;

/// Snapshot of the player's statistics as seen by the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSnapshot {
    /// Named numeric statistics (cash, reputation, stress, ...).
    pub stats: BTreeMap<String, Decimal>,
    /// Named skills used by skill checks.
    pub skills: BTreeMap<String, i32>,
    pub rank: Rank,
}

impl PlayerSnapshot {
    /// Missing stats read as zero.
    pub fn stat(&self, key: &str) -> Decimal {
        self.stats.get(key).copied().unwrap_or(Decimal::ZERO)
    }

    /// Missing skills read as zero.
    pub fn skill(&self, key: &str) -> i32 {
        self.skills.get(key).copied().unwrap_or(0)
    }

    pub fn with_stat(mut self, key: impl Into<String>, value: Decimal) -> Self {
        self.stats.insert(key.into(), value);
        self
    }

    pub fn with_skill(mut self, key: impl Into<String>, value: i32) -> Self {
        self.skills.insert(key.into(), value);
        self
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = rank;
        self
    }
}

/// Caller-provided state, refreshed before each engine query or command.
#[derive(Clone, Copy, Debug)]
pub struct StateSnapshot<'a> {
    pub player: &'a PlayerSnapshot,
    pub npcs: &'a NpcRoster,
    pub market: MarketCondition,
}

impl<'a> StateSnapshot<'a> {
    pub fn new(player: &'a PlayerSnapshot, npcs: &'a NpcRoster, market: MarketCondition) -> Self {
        Self {
            player,
            npcs,
            market,
        }
    }

    /// Combine with the engine's world flags into an evaluation context.
    pub fn with_flags(self, flags: &'a WorldFlags) -> EvalContext<'a> {
        EvalContext {
            player: self.player,
            npcs: self.npcs,
            flags,
            market: self.market,
        }
    }
}

/// Everything a requirement can look at.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext<'a> {
    pub player: &'a PlayerSnapshot,
    pub npcs: &'a NpcRoster,
    pub flags: &'a WorldFlags,
    pub market: MarketCondition,
}

impl EvalContext<'_> {
    /// Relationship with an NPC; unknown NPCs read as zero.
    pub fn relationship(&self, npc: &NpcId) -> i32 {
        self.npcs.get(npc).map(|n| n.relationship).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_additive_until_removed() {
        let mut flags = WorldFlags::new();
        assert!(flags.insert("MET_SARAH"));
        assert!(!flags.insert("MET_SARAH"));
        assert_eq!(flags.len(), 1);
        assert!(flags.remove("MET_SARAH"));
        assert!(flags.is_empty());
    }

    #[test]
    fn ranks_are_ordered() {
        assert!(Rank::Analyst < Rank::Associate);
        assert!(Rank::Partner < Rank::ManagingPartner);
    }

    #[test]
    fn missing_values_read_as_zero() {
        let p = PlayerSnapshot::default().with_stat("cash", Decimal::new(10, 0));
        assert_eq!(p.stat("cash"), Decimal::new(10, 0));
        assert_eq!(p.stat("reputation"), Decimal::ZERO);
        assert_eq!(p.skill("negotiation"), 0);
        let npcs = NpcRoster::new();
        let flags: WorldFlags = ["A", "B"].into_iter().collect();
        let ctx = StateSnapshot::new(&p, &npcs, MarketCondition::Bull).with_flags(&flags);
        assert_eq!(ctx.relationship(&NpcId::from("sarah")), 0);
        assert!(ctx.flags.contains("B"));
    }
}
