//! Requirement evaluation.

use serde::{Deserialize, Serialize};
use story_core::{EvalContext, EventRequirements};

/// Outcome of a requirement check with the first failing clause's reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl Eligibility {
    pub fn ok() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluate `requirements` against `ctx`.
///
/// Clauses are checked in a fixed order: stat-min, stat-max, flag-required,
/// flag-forbidden, npc-relationship-min, rank-min, market condition. Keys
/// within a clause are visited in sorted order, so the reason returned for a
/// given state is always the same. No clause present means eligible.
pub fn evaluate(requirements: &EventRequirements, ctx: &EvalContext<'_>) -> Eligibility {
    match first_failure(requirements, ctx) {
        Some(reason) => Eligibility::blocked(reason),
        None => Eligibility::ok(),
    }
}

fn first_failure(req: &EventRequirements, ctx: &EvalContext<'_>) -> Option<String> {
    for (stat, min) in &req.min_stats {
        let have = ctx.player.stat(stat);
        if have < *min {
            return Some(format!("requires {stat} of at least {min} (have {have})"));
        }
    }
    for (stat, max) in &req.max_stats {
        let have = ctx.player.stat(stat);
        if have > *max {
            return Some(format!("requires {stat} of at most {max} (have {have})"));
        }
    }
    if let Some(flag) = req.required_flags.iter().find(|f| !ctx.flags.contains(f)) {
        return Some(format!("requires {flag}"));
    }
    if let Some(flag) = req.forbidden_flags.iter().find(|f| ctx.flags.contains(f)) {
        return Some(format!("unavailable once {flag} is set"));
    }
    for r in &req.min_relationships {
        let have = ctx.relationship(&r.npc);
        if have < r.min {
            return Some(format!(
                "requires relationship with {} of at least {} (have {have})",
                r.npc, r.min
            ));
        }
    }
    if let Some(min) = req.min_rank {
        if ctx.player.rank < min {
            return Some(format!("requires rank {min:?} or above"));
        }
    }
    if !req.market_conditions.is_empty() && !req.market_conditions.contains(&ctx.market) {
        return Some(format!("not available in a {:?} market", ctx.market));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use story_core::{MarketCondition, NpcRoster, NpcState, PlayerSnapshot, Rank, StateSnapshot, WorldFlags};

    fn check(req: &EventRequirements, player: &PlayerSnapshot, npcs: &NpcRoster, flags: &WorldFlags) -> Eligibility {
        let ctx = StateSnapshot::new(player, npcs, MarketCondition::Normal).with_flags(flags);
        evaluate(req, &ctx)
    }

    #[test]
    fn no_clauses_is_eligible() {
        let e = check(
            &EventRequirements::default(),
            &PlayerSnapshot::default(),
            &NpcRoster::new(),
            &WorldFlags::new(),
        );
        assert_eq!(e, Eligibility::ok());
    }

    #[test]
    fn required_flag_gates_event() {
        let req = EventRequirements::default().with_required_flag("MET_SARAH");
        let player = PlayerSnapshot::default();
        let npcs = NpcRoster::new();
        let mut flags = WorldFlags::new();
        let e = check(&req, &player, &npcs, &flags);
        assert!(!e.eligible);
        assert_eq!(e.reason.as_deref(), Some("requires MET_SARAH"));
        flags.insert("MET_SARAH");
        assert!(check(&req, &player, &npcs, &flags).eligible);
    }

    #[test]
    fn first_failing_clause_wins() {
        // stat-min fails before the forbidden flag is considered
        let req = EventRequirements::default()
            .with_min_stat("reputation", Decimal::new(50, 0))
            .with_forbidden_flag("FIRED");
        let flags: WorldFlags = ["FIRED"].into_iter().collect();
        let e = check(&req, &PlayerSnapshot::default(), &NpcRoster::new(), &flags);
        assert!(e.reason.unwrap().contains("reputation"));

        let player = PlayerSnapshot::default().with_stat("reputation", Decimal::new(80, 0));
        let e = check(&req, &player, &NpcRoster::new(), &flags);
        assert_eq!(e.reason.as_deref(), Some("unavailable once FIRED is set"));
    }

    #[test]
    fn max_stat_relationship_and_rank() {
        let req = EventRequirements::default()
            .with_max_stat("stress", Decimal::new(70, 0))
            .with_min_relationship("sarah", 20)
            .with_min_rank(Rank::VicePresident);
        let mut npcs = NpcRoster::new();
        let flags = WorldFlags::new();

        let stressed = PlayerSnapshot::default().with_stat("stress", Decimal::new(90, 0));
        assert!(check(&req, &stressed, &npcs, &flags).reason.unwrap().contains("stress"));

        let calm = PlayerSnapshot::default().with_stat("stress", Decimal::new(10, 0));
        assert!(check(&req, &calm, &npcs, &flags).reason.unwrap().contains("sarah"));

        npcs.insert("sarah".into(), NpcState { relationship: 25, trust: 0 });
        assert!(check(&req, &calm, &npcs, &flags).reason.unwrap().contains("VicePresident"));

        let promoted = calm.with_rank(Rank::Partner);
        assert!(check(&req, &promoted, &npcs, &flags).eligible);
    }

    #[test]
    fn market_condition_clause() {
        let req = EventRequirements::default().with_market(MarketCondition::Crisis);
        let player = PlayerSnapshot::default();
        let npcs = NpcRoster::new();
        let flags = WorldFlags::new();
        let normal = StateSnapshot::new(&player, &npcs, MarketCondition::Normal).with_flags(&flags);
        assert!(!evaluate(&req, &normal).eligible);
        let crisis = StateSnapshot::new(&player, &npcs, MarketCondition::Crisis).with_flags(&flags);
        assert!(evaluate(&req, &crisis).eligible);
    }

    proptest! {
        #[test]
        fn min_stat_is_inclusive(have in -1_000i64..1_000, min in -1_000i64..1_000) {
            let req = EventRequirements::default().with_min_stat("cash", Decimal::new(min, 0));
            let player = PlayerSnapshot::default().with_stat("cash", Decimal::new(have, 0));
            let e = check(&req, &player, &NpcRoster::new(), &WorldFlags::new());
            prop_assert_eq!(e.eligible, have >= min);
            prop_assert_eq!(e.reason.is_some(), have < min);
        }
    }
}
