//! CLI for kauflern.
//!
//! Chooses offers for customers, feeds observed rewards back into the agent and
//! analyzes logged outcomes. Learned state survives between invocations in a
//! JSON state file; everything printed to stdout is JSON, logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kauflern_bandits::{AgentConfig, OfferAgent};
use kauflern_core::{default_catalog, Decision, Offer, Policy, UserContext};
use kauflern_feedback::{read_outcomes, FeedbackAnalyzer, OfferOutcome, PersonalizationMetrics};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Agent configuration (JSON)
    #[arg(long, global = true, env = "KAUFLERN_CONFIG")]
    config: Option<PathBuf>,

    /// Offer catalog as a JSON array (default: built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Path to the state file
    #[arg(long, global = true, default_value = "data/kauflern.state.json")]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Choose an offer for a customer
    Decide {
        #[arg(long)]
        user: String,

        /// Customer context (JSON); an empty context if omitted
        #[arg(long)]
        context: Option<PathBuf>,

        /// Seed for the random source
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Feed the observed reward for an offer back into the agent
    Reward {
        #[arg(long)]
        user: String,

        #[arg(long)]
        offer: String,

        /// Explicit reward; takes precedence over --outcome
        #[arg(long, allow_negative_numbers = true)]
        reward: Option<f64>,

        /// Outcome context (JSON) the reward is computed from
        #[arg(long)]
        outcome: Option<PathBuf>,

        /// Count this outcome as a conversion
        #[arg(long)]
        converted: bool,

        /// Append the outcome to this JSONL log
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Print decision metrics and learner state
    Stats,
    /// Analyze logged outcomes and propose exploration adjustments
    Analyze {
        /// Outcomes as JSON Lines
        #[arg(long)]
        outcomes: PathBuf,

        #[arg(long, default_value = "10")]
        min_decisions: usize,

        #[arg(long, default_value = "0.5")]
        min_confidence: f64,

        /// Name of the policy the proposal is based on
        #[arg(long, default_value = "offer-agent")]
        basis: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct AgentState {
    /// Agent snapshot as produced by `Policy::snapshot`
    #[serde(default)]
    agent: Value,
    #[serde(default)]
    metrics: PersonalizationMetrics,
    #[serde(default, with = "time::serde::iso8601::option")]
    last_updated: Option<OffsetDateTime>,
}

impl AgentState {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path)?;
        let state = serde_json::from_reader(BufReader::new(file))?;
        Ok(state)
    }

    /// Writes to a sibling temp file first, so a crash never leaves a
    /// half-written state file behind.
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, json)?;
        if let Err(err) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err).with_context(|| format!("Failed to replace {:?}", path));
        }
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    let Some(path) = path else {
        return Ok(AgentConfig::default());
    };
    let file = File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid config {:?}", path))?;
    Ok(config)
}

fn load_catalog(path: Option<&Path>) -> Result<Vec<Offer>> {
    let Some(path) = path else {
        return Ok(default_catalog());
    };
    let file = File::open(path).with_context(|| format!("Failed to open catalog {:?}", path))?;
    let offers: Vec<Offer> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid catalog {:?}", path))?;
    Ok(offers)
}

fn read_context(path: &Path) -> Result<UserContext> {
    let file = File::open(path).with_context(|| format!("Failed to open context {:?}", path))?;
    let ctx = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid context {:?}", path))?;
    Ok(ctx)
}

fn build_agent(config: AgentConfig, seed: Option<u64>, state: &AgentState) -> Result<OfferAgent> {
    let mut agent = match seed {
        Some(seed) => OfferAgent::seeded(config, seed)?,
        None => OfferAgent::new(config)?,
    };
    if !state.agent.is_null() {
        agent
            .load(state.agent.clone())
            .context("Failed to restore agent state")?;
    }
    Ok(agent)
}

fn append_outcome(path: &Path, outcome: &OfferOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(outcome)?)?;
    Ok(())
}

fn timestamp(now: OffsetDateTime) -> String {
    now.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[derive(Serialize)]
struct DecisionRecord<'a> {
    ts: String,
    user_id: &'a str,
    decision: &'a Decision,
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let now = OffsetDateTime::now_utc();

    match cli.command {
        Commands::Decide {
            user,
            context,
            seed,
        } => {
            let offers = load_catalog(cli.catalog.as_deref())?;
            let ctx = match context {
                Some(path) => read_context(&path)?,
                None => UserContext::default(),
            };
            let mut state = AgentState::load(&cli.state_file).context("Failed to load state")?;
            let mut agent = build_agent(config, seed, &state)?;

            let decision = agent.decide_at(&user, &offers, &ctx, now)?;
            state.metrics.record_decision(decision.score);
            state.agent = agent.snapshot();
            state.last_updated = Some(now);
            state.save(&cli.state_file).context("Failed to save state")?;

            let record = DecisionRecord {
                ts: timestamp(now),
                user_id: &user,
                decision: &decision,
            };
            serde_json::to_writer_pretty(&mut *out, &record)?;
            writeln!(out)?;
        }
        Commands::Reward {
            user,
            offer,
            reward,
            outcome,
            converted,
            log,
        } => {
            let outcome_ctx = outcome.as_deref().map(read_context).transpose()?;
            let mut state = AgentState::load(&cli.state_file).context("Failed to load state")?;
            let mut agent = build_agent(config, None, &state)?;

            let reward = match (reward, &outcome_ctx) {
                (Some(reward), _) => reward,
                (None, Some(ctx)) => agent.compute_reward(ctx),
                (None, None) => bail!("Either --reward or --outcome is required"),
            };
            let converted = converted || outcome_ctx.as_ref().is_some_and(|c| c.conversion);

            let estimate = agent.update_offer_performance(&user, &offer, reward)?;
            debug!(%user, %offer, reward, estimate, "reward recorded");
            if converted {
                state.metrics.record_conversion();
            }
            state.agent = agent.snapshot();
            state.last_updated = Some(now);
            state.save(&cli.state_file).context("Failed to save state")?;

            if let Some(log) = log {
                let offers = load_catalog(cli.catalog.as_deref())?;
                let kind = offers.iter().find(|o| o.id == offer).map(|o| o.kind);
                if kind.is_none() {
                    warn!(%offer, "offer not in catalog; logging without kind");
                }
                let record = OfferOutcome {
                    offer_kind: kind,
                    ts: timestamp(now),
                    ..OfferOutcome::new(&user, &offer, converted, Some(reward))
                };
                append_outcome(&log, &record).context("Failed to append outcome")?;
            }

            let summary = json!({
                "user_id": user,
                "offer_id": offer,
                "reward": reward,
                "estimate": estimate,
                "converted": converted,
                "exploration_rate": agent.exploration_rate(),
            });
            serde_json::to_writer_pretty(&mut *out, &summary)?;
            writeln!(out)?;
        }
        Commands::Stats => {
            let state = AgentState::load(&cli.state_file).context("Failed to load state")?;
            let agent = build_agent(config, None, &state)?;
            let summary = json!({
                "total_decisions": state.metrics.total_decisions,
                "conversions": state.metrics.conversions,
                "conversion_rate": state.metrics.conversion_rate(),
                "average_score": state.metrics.average_score(),
                "exploration_rate": agent.exploration_rate(),
                "estimates": agent.learner().estimates().count(),
                "customers": agent.preferences().len(),
                "last_updated": state.last_updated.map(timestamp),
            });
            serde_json::to_writer_pretty(&mut *out, &summary)?;
            writeln!(out)?;
        }
        Commands::Analyze {
            outcomes,
            min_decisions,
            min_confidence,
            basis,
        } => {
            let file = File::open(&outcomes)
                .with_context(|| format!("Failed to open outcomes {:?}", outcomes))?;
            let outcomes = read_outcomes(BufReader::new(file))?;
            let analyzer = FeedbackAnalyzer::new(min_decisions, min_confidence);

            let overall = analyzer.summarize(&outcomes);
            let by_offer: BTreeMap<_, _> = analyzer
                .aggregate_outcomes(&outcomes, |o| Some(o.offer_id.clone()))
                .into_iter()
                .map(|(offer_id, stats)| {
                    let entry = json!({
                        "total": stats.total,
                        "conversions": stats.conversions,
                        "conversion_rate": stats.conversion_rate(),
                        "average_reward": stats.average_reward(),
                    });
                    (offer_id, entry)
                })
                .collect();

            let report = json!({
                "outcomes": overall.total,
                "conversion_rate": overall.conversion_rate(),
                "average_reward": overall.average_reward(),
                "by_offer": by_offer,
                "patterns": analyzer.analyze_patterns(&outcomes),
                "proposal": analyzer.propose_adjustment(&basis, &outcomes),
            });
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    run(cli, &mut stdout.lock())
}
