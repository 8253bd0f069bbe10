//! Choice resolution with an injected d100 roll source.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use story_core::{EventChoice, EventConsequences, PlayerSnapshot};
use tracing::debug;

/// Source of uniform integer draws in `[1, 100]`.
pub trait RollSource {
    fn roll_d100(&mut self) -> u32;
}

impl RollSource for ChaCha8Rng {
    fn roll_d100(&mut self) -> u32 {
        self.gen_range(1..=100)
    }
}

/// Seeded roll source used by the engine.
pub fn seeded_rolls(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Replays a fixed sequence of draws; once exhausted, repeats the last one.
/// Useful for tests and for replaying a recorded playthrough.
#[derive(Clone, Debug)]
pub struct ScriptedRolls {
    rolls: VecDeque<u32>,
    last: u32,
}

impl ScriptedRolls {
    pub fn new(rolls: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            last: 50,
        }
    }
}

impl RollSource for ScriptedRolls {
    fn roll_d100(&mut self) -> u32 {
        if let Some(r) = self.rolls.pop_front() {
            self.last = r.clamp(1, 100);
        }
        self.last
    }
}

/// Decision for a single choice plus the payload to apply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub success: bool,
    /// Final roll compared against the threshold; skill rolls include the
    /// player's skill value.
    pub rolled: Option<i32>,
    pub threshold: Option<i32>,
    pub critical: bool,
    pub critical_failure: bool,
    pub consequences: EventConsequences,
}

/// Resolves choices. Never touches external state.
#[derive(Clone, Copy, Debug)]
pub struct ChoiceResolver {
    critical_band: u32,
}

impl Default for ChoiceResolver {
    fn default() -> Self {
        Self { critical_band: 5 }
    }
}

impl ChoiceResolver {
    /// `critical_band` is the width in percent of the top (critical success)
    /// and bottom (critical failure) bands of a skill roll.
    pub fn new(critical_band: u32) -> Self {
        Self {
            critical_band: critical_band.min(50),
        }
    }

    /// Resolve `choice` for `player`.
    ///
    /// Policy, in order:
    /// 1. no skill check and no flat chance: always succeeds
    /// 2. flat `success_chance`: success iff d100 <= chance
    /// 3. `skill_check`: success iff d100 + skill >= threshold
    pub fn resolve<R: RollSource + ?Sized>(
        &self,
        choice: &EventChoice,
        player: &PlayerSnapshot,
        rolls: &mut R,
    ) -> Resolution {
        if let Some(chance) = choice.success_chance {
            let draw = rolls.roll_d100().clamp(1, 100);
            let success = draw <= u32::from(chance);
            debug!(choice = %choice.id, draw, chance, success, "flat chance resolved");
            return Resolution {
                success,
                rolled: Some(draw as i32),
                threshold: Some(i32::from(chance)),
                critical: false,
                critical_failure: false,
                consequences: pick(choice, success, false),
            };
        }
        if let Some(check) = &choice.skill_check {
            let raw = rolls.roll_d100().clamp(1, 100);
            let skill = player.skill(&check.skill);
            let roll = (raw as i32).saturating_add(skill);
            let success = roll >= check.threshold;
            let critical = success && raw > 100 - self.critical_band;
            let critical_failure = !success && raw <= self.critical_band;
            debug!(
                choice = %choice.id,
                skill = %check.skill,
                raw,
                roll,
                threshold = check.threshold,
                success,
                critical,
                "skill check resolved"
            );
            return Resolution {
                success,
                rolled: Some(roll),
                threshold: Some(check.threshold),
                critical,
                critical_failure,
                consequences: pick(choice, success, critical),
            };
        }
        Resolution {
            success: true,
            rolled: None,
            threshold: None,
            critical: false,
            critical_failure: false,
            consequences: choice.on_success.clone(),
        }
    }
}

fn pick(choice: &EventChoice, success: bool, critical: bool) -> EventConsequences {
    match (success, critical, &choice.on_critical_success) {
        (true, true, Some(enhanced)) => enhanced.clone(),
        (true, _, _) => choice.on_success.clone(),
        (false, _, _) => choice.failure_consequences().clone(),
    }
}
