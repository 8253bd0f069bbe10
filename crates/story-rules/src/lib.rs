#![deny(warnings)]

//! Pure narrative rules for the story engine.
//!
//! This crate provides side-effect free helpers for:
//! - Evaluating event and choice requirements against a state snapshot
//! - Resolving a choice, optionally through a seeded d100 skill check
//! - Translating consequence payloads into the `StatDelta` envelope the
//!   external player-state store commits

mod consequences;
mod requirements;
mod resolver;

pub use consequences::{apply_consequences, StatDelta};
pub use requirements::{evaluate, Eligibility};
pub use resolver::{seeded_rolls, ChoiceResolver, Resolution, RollSource, ScriptedRolls};
