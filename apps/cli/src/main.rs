#![deny(warnings)]

//! Headless autopilot: loads a content directory, plays N weeks taking the
//! first eligible choice on every queued event, and reports KPIs.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use story_core::{
    ArcId, ArcProgress, Catalog, ChoiceId, EventId, MarketCondition, NpcRoster, NpcState,
    PlayerSnapshot, StateSnapshot,
};
use story_engine::{ChoiceRequest, StoryEngine};
use story_rules::{evaluate, StatDelta};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    content: PathBuf,
    weeks: u32,
    seed: Option<u64>,
    market: MarketCondition,
    json: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(argv: I) -> Result<Args> {
    let mut args = Args {
        content: PathBuf::from("assets/content"),
        weeks: 12,
        seed: None,
        market: MarketCondition::Normal,
        json: false,
    };
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--content" => {
                args.content = it.next().map(PathBuf::from).context("--content needs a path")?
            }
            "--weeks" => {
                args.weeks = it
                    .next()
                    .and_then(|s| s.parse().ok())
                    .context("--weeks needs a number")?
            }
            "--seed" => {
                args.seed = Some(
                    it.next()
                        .and_then(|s| s.parse().ok())
                        .context("--seed needs a number")?,
                )
            }
            "--market" => {
                args.market = match it.next().as_deref() {
                    Some("bull") => MarketCondition::Bull,
                    Some("normal") => MarketCondition::Normal,
                    Some("bear") => MarketCondition::Bear,
                    Some("crisis") => MarketCondition::Crisis,
                    other => bail!("unknown market {:?}", other),
                }
            }
            "--json" => args.json = true,
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    Ok(args)
}

/// In-memory stand-in for the external player-state store.
struct Ledger {
    player: PlayerSnapshot,
    npcs: NpcRoster,
}

impl Ledger {
    fn new(catalog: &Catalog) -> Self {
        let player = PlayerSnapshot::default()
            .with_stat("cash", Decimal::new(10_000, 0))
            .with_stat("reputation", Decimal::ZERO)
            .with_stat("stress", Decimal::ZERO)
            .with_skill("financialEngineering", 20)
            .with_skill("negotiation", 30);
        let mut npcs = NpcRoster::new();
        for event in catalog.events() {
            npcs.extend(event.source_npc.iter().map(|n| (n.clone(), NpcState::default())));
            for r in &event.requirements.min_relationships {
                npcs.entry(r.npc.clone()).or_default();
            }
            for outcome in event.choices.iter().flat_map(|c| c.outcomes()) {
                for npc in outcome.relationship_deltas.keys().chain(outcome.trust_deltas.keys()) {
                    npcs.entry(npc.clone()).or_default();
                }
            }
        }
        Self { player, npcs }
    }

    fn snapshot(&self, market: MarketCondition) -> StateSnapshot<'_> {
        StateSnapshot::new(&self.player, &self.npcs, market)
    }

    /// The single commit path for engine deltas.
    fn commit(&mut self, delta: &StatDelta) {
        for (stat, d) in &delta.stats {
            *self.player.stats.entry(stat.clone()).or_default() += *d;
        }
        for (npc, d) in &delta.relationships {
            if let Some(n) = self.npcs.get_mut(npc) {
                n.relationship += d;
            }
        }
        for (npc, d) in &delta.trust {
            if let Some(n) = self.npcs.get_mut(npc) {
                n.trust += d;
            }
        }
        for note in &delta.notifications {
            info!(title = %note.title, severity = ?note.severity, "{}", note.message);
        }
    }
}

#[derive(Serialize)]
struct Resolved {
    event: EventId,
    choice: ChoiceId,
    success: bool,
    critical: bool,
}

#[derive(Serialize)]
struct WeekSummary {
    week: u32,
    date: NaiveDate,
    resolved: Vec<Resolved>,
    auto_resolved: usize,
    dismissed: usize,
    lapsed: usize,
}

#[derive(Serialize)]
struct Report {
    weeks: Vec<WeekSummary>,
    player: PlayerSnapshot,
    npcs: NpcRoster,
    flags: Vec<String>,
    arcs: BTreeMap<ArcId, ArcProgress>,
    completed: usize,
    lapsed: usize,
}

enum Action {
    Choose(ChoiceRequest),
    Dismiss(EventId),
    Stuck(EventId),
}

/// First queued event (priority before optional) and what to do with it.
fn next_action(
    engine: &StoryEngine,
    ledger: &Ledger,
    market: MarketCondition,
) -> Option<Action> {
    let snap = ledger.snapshot(market);
    let view = engine.queue(snap);
    let is_priority = view.priority.is_some();
    let queued = view.priority.or_else(|| view.optional.into_iter().next())?;
    let event = engine.catalog().event(&queued.event_id)?;
    let ctx = snap.with_flags(engine.flags());
    let choice = event
        .choices
        .iter()
        .find(|c| evaluate(&c.requirements, &ctx).eligible);
    Some(match (choice, is_priority) {
        (Some(c), _) => Action::Choose(ChoiceRequest::new(event.id.clone(), c.id.clone()).confirmed()),
        (None, false) => Action::Dismiss(event.id.clone()),
        (None, true) => Action::Stuck(event.id.clone()),
    })
}

fn play_week(
    engine: &mut StoryEngine,
    ledger: &mut Ledger,
    market: MarketCondition,
) -> Result<WeekSummary> {
    let status = engine.flow_status();
    let mut summary = WeekSummary {
        week: status.week,
        date: status.date,
        resolved: Vec::new(),
        auto_resolved: 0,
        dismissed: 0,
        lapsed: 0,
    };
    while let Some(action) = next_action(engine, ledger, market) {
        match action {
            Action::Choose(request) => {
                let result = engine.make_choice(&request, ledger.snapshot(market))?;
                ledger.commit(&result.effects.delta);
                summary.auto_resolved += result.effects.auto_resolved.len();
                summary.resolved.push(Resolved {
                    event: result.event_id,
                    choice: result.choice_id,
                    success: result.resolution.success,
                    critical: result.resolution.critical,
                });
            }
            Action::Dismiss(id) => {
                engine.dismiss_event(&id)?;
                summary.dismissed += 1;
            }
            Action::Stuck(id) => bail!("priority event {id} has no eligible choice"),
        }
    }
    Ok(summary)
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_SHA"),
        built = env!("BUILD_DATE"),
        content = %args.content.display(),
        weeks = args.weeks,
        "starting deal-desk autopilot"
    );

    let content = story_content::load_dir(&args.content)
        .with_context(|| format!("loading content from {}", args.content.display()))?;
    let mut config = content.config;
    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    let mut ledger = Ledger::new(&content.catalog);
    let mut engine = StoryEngine::new(content.catalog, config)?;

    let opening = engine.start(ledger.snapshot(args.market))?;
    ledger.commit(&opening.effects.delta);
    let mut auto_carry = opening.effects.auto_resolved.len();

    let mut weeks = Vec::new();
    for i in 0..args.weeks {
        let mut summary = play_week(&mut engine, &mut ledger, args.market)?;
        summary.auto_resolved += auto_carry;
        if i + 1 < args.weeks {
            let report = engine.advance_week(ledger.snapshot(args.market))?;
            ledger.commit(&report.effects.delta);
            summary.lapsed = report.lapsed.len();
            auto_carry = report.effects.auto_resolved.len();
        } else {
            summary.lapsed = engine.end_week()?.lapsed.len();
        }
        weeks.push(summary);
    }

    let report = Report {
        completed: engine.completed_events().len(),
        lapsed: engine.lapsed_events().len(),
        flags: engine.flags().iter().map(str::to_string).collect(),
        arcs: engine
            .catalog()
            .arcs()
            .map(|a| (a.id.clone(), engine.arc_progress(&a.id)))
            .collect(),
        player: ledger.player.clone(),
        npcs: ledger.npcs.clone(),
        weeks,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "deal-desk {} ({} {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_SHA"),
        env!("BUILD_DATE")
    );
    for w in &report.weeks {
        let wins = w.resolved.iter().filter(|r| r.success).count();
        println!(
            "week {:>2} ({}) | resolved: {} ({} won) | auto: {} | dismissed: {} | lapsed: {}",
            w.week,
            w.date,
            w.resolved.len(),
            wins,
            w.auto_resolved,
            w.dismissed,
            w.lapsed
        );
    }
    println!(
        "KPI | weeks: {} | completed: {} | lapsed: {} | flags: {} | cash: {} | reputation: {} | stress: {}",
        report.weeks.len(),
        report.completed,
        report.lapsed,
        report.flags.len(),
        report.player.stat("cash"),
        report.player.stat("reputation"),
        report.player.stat("stress")
    );
    for (arc, progress) in &report.arcs {
        println!(
            "arc {} | {:?} at stage {}",
            arc, progress.state, progress.current_stage
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse_args(argv(&["--weeks", "3", "--seed", "42", "--market", "bear", "--json"]))
            .unwrap();
        assert_eq!(args.weeks, 3);
        assert_eq!(args.seed, Some(42));
        assert_eq!(args.market, MarketCondition::Bear);
        assert!(args.json);
    }

    #[test]
    fn malformed_seed_is_rejected() {
        assert!(parse_args(argv(&["--seed", "twelve"])).is_err());
        assert!(parse_args(argv(&["--seed"])).is_err());
    }
}
