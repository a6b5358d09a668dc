#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Offer outcome analysis and exploration tuning.
//!
//! This crate looks back at how chosen offers performed and proposes
//! configuration changes for the agent. It follows the principle:
//! **kauflern-feedback analyzes and proposes, never modifies a live agent**.

use kauflern_core::{Channel, OfferKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

// Confidence calculation constants
/// Sample size at which confidence plateaus
const CONFIDENCE_SAMPLE_SIZE_PLATEAU: f64 = 50.0;
/// Confidence level when 2+ patterns detected
const CONFIDENCE_HIGH_PATTERN: f64 = 0.7;
/// Confidence level when fewer patterns detected
const CONFIDENCE_LOW_PATTERN: f64 = 0.5;
const CONFIDENCE_SAMPLE_WEIGHT: f64 = 0.4;
const CONFIDENCE_PATTERN_WEIGHT: f64 = 0.6;

// Pattern detection thresholds
/// Minimum outcomes for one offer before its conversion rate is judged
const PATTERN_MIN_OUTCOMES_PER_OFFER: usize = 5;
/// Conversion rate below which an offer is flagged
const PATTERN_LOW_OFFER_CONVERSION: f64 = 0.2;
/// Conversion rate below which the whole catalog is flagged
const PATTERN_LOW_OVERALL_CONVERSION: f64 = 0.25;

// Adjustments
/// Added to the exploration rate when overall conversion is low
const ADJUSTMENT_EXPLORATION_DELTA: f64 = 0.05;
/// Added to the heuristic bonus of an underperforming offer kind
const ADJUSTMENT_RULE_BONUS_DELTA: f64 = -0.05;

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Failed to read outcomes: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid outcome on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// What happened after an offer was shown to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferOutcome {
    /// Reference to the decision, if the caller tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    pub ts: String,
    pub user_id: String,
    pub offer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_kind: Option<OfferKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    pub converted: bool,
    /// Reward reported to the agent for this outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
}

impl OfferOutcome {
    pub fn new(user_id: &str, offer_id: &str, converted: bool, reward: Option<f64>) -> Self {
        Self {
            decision_id: None,
            ts: iso8601_now(),
            user_id: user_id.to_string(),
            offer_id: offer_id.to_string(),
            offer_kind: None,
            channel: None,
            converted,
            reward,
        }
    }
}

/// Reads outcomes from JSON Lines, skipping blank lines.
pub fn read_outcomes(reader: impl BufRead) -> Result<Vec<OfferOutcome>, FeedbackError> {
    let mut outcomes = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = serde_json::from_str(&line).map_err(|source| FeedbackError::Parse {
            line: idx + 1,
            source,
        })?;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Running counters over decisions and conversions.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationMetrics {
    pub total_decisions: u64,
    pub conversions: u64,
    /// Number of decisions that carried a score (exploit decisions).
    pub scored_decisions: u64,
    pub score_sum: f64,
}

impl PersonalizationMetrics {
    pub fn record_decision(&mut self, score: Option<f64>) {
        self.total_decisions += 1;
        if let Some(score) = score.filter(|s| s.is_finite()) {
            self.scored_decisions += 1;
            self.score_sum += score;
        }
    }

    pub fn record_conversion(&mut self) {
        self.conversions += 1;
    }

    /// Conversions per decision, `0` before the first decision.
    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.conversions as f64 / self.total_decisions as f64
        }
    }

    /// Mean score of exploit decisions, `0` if there were none.
    #[must_use]
    pub fn average_score(&self) -> f64 {
        if self.scored_decisions == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.score_sum / self.scored_decisions as f64
        }
    }
}

/// Evidence supporting a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub outcomes_analyzed: usize,
    pub conversion_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
}

/// Proposed changes to an agent configuration. Each delta is added to the
/// value at its field path (e.g. `initial_exploration_rate`,
/// `rules.fixed.bonus`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationAdjustmentProposal {
    pub version: String,
    pub basis_policy: String,
    pub ts: String,
    pub deltas: BTreeMap<String, f64>,
    /// Confidence in the proposal (0.0 to 1.0)
    pub confidence: f64,
    pub evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Vec<String>>,
}

/// Aggregated outcomes for one grouping key.
#[derive(Debug, Default, Clone)]
pub struct OutcomeStatistics {
    pub total: usize,
    pub conversions: usize,
    pub rewarded: usize,
    pub total_reward: f64,
}

impl OutcomeStatistics {
    fn add(&mut self, outcome: &OfferOutcome) {
        self.total += 1;
        if outcome.converted {
            self.conversions += 1;
        }
        if let Some(reward) = outcome.reward.filter(|r| r.is_finite()) {
            self.rewarded += 1;
            self.total_reward += reward;
        }
    }

    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.conversions as f64 / self.total as f64
        }
    }

    /// Mean over outcomes that reported a finite reward.
    #[must_use]
    pub fn average_reward(&self) -> f64 {
        if self.rewarded == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.total_reward / self.rewarded as f64
        }
    }
}

#[derive(Debug)]
pub struct FeedbackAnalyzer {
    /// Minimum number of outcomes before anything is proposed
    min_decisions: usize,
    min_confidence: f64,
}

impl Default for FeedbackAnalyzer {
    fn default() -> Self {
        Self {
            min_decisions: 10,
            min_confidence: 0.5,
        }
    }
}

impl FeedbackAnalyzer {
    #[must_use]
    pub fn new(min_decisions: usize, min_confidence: f64) -> Self {
        Self {
            min_decisions,
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Aggregate outcomes by a grouping key (offer, kind, channel, ...).
    #[must_use]
    pub fn aggregate_outcomes(
        &self,
        outcomes: &[OfferOutcome],
        key_fn: impl Fn(&OfferOutcome) -> Option<String>,
    ) -> HashMap<String, OutcomeStatistics> {
        let mut stats: HashMap<String, OutcomeStatistics> = HashMap::new();
        for outcome in outcomes {
            if let Some(key) = key_fn(outcome) {
                stats.entry(key).or_default().add(outcome);
            }
        }
        stats
    }

    #[must_use]
    pub fn summarize(&self, outcomes: &[OfferOutcome]) -> OutcomeStatistics {
        let mut stats = OutcomeStatistics::default();
        for outcome in outcomes {
            stats.add(outcome);
        }
        stats
    }

    /// Heuristic patterns worth acting on. Sorted for stable output.
    #[must_use]
    pub fn analyze_patterns(&self, outcomes: &[OfferOutcome]) -> Vec<String> {
        let mut patterns = Vec::new();
        if outcomes.len() < self.min_decisions {
            return patterns;
        }

        let by_offer = self.aggregate_outcomes(outcomes, |o| Some(o.offer_id.clone()));
        for (offer_id, stats) in &by_offer {
            if stats.total >= PATTERN_MIN_OUTCOMES_PER_OFFER
                && stats.conversion_rate() < PATTERN_LOW_OFFER_CONVERSION
            {
                patterns.push(format!(
                    "Low conversion rate ({:.1}%) for offer '{}'",
                    stats.conversion_rate() * 100.0,
                    offer_id
                ));
            }
        }
        patterns.sort();

        let overall = self.summarize(outcomes);
        if overall.conversion_rate() < PATTERN_LOW_OVERALL_CONVERSION {
            patterns.push(format!(
                "Overall conversion rate is low ({:.1}%)",
                overall.conversion_rate() * 100.0
            ));
        }

        patterns
    }

    /// Returns `None` with too little data, no patterns, or low confidence.
    #[must_use]
    pub fn propose_adjustment(
        &self,
        basis_policy: &str,
        outcomes: &[OfferOutcome],
    ) -> Option<ExplorationAdjustmentProposal> {
        if outcomes.len() < self.min_decisions {
            return None;
        }
        let patterns = self.analyze_patterns(outcomes);
        if patterns.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let confidence = {
            let sample_confidence =
                (outcomes.len() as f64 / CONFIDENCE_SAMPLE_SIZE_PLATEAU).min(1.0);
            let pattern_confidence = if patterns.len() >= 2 {
                CONFIDENCE_HIGH_PATTERN
            } else {
                CONFIDENCE_LOW_PATTERN
            };
            (sample_confidence * CONFIDENCE_SAMPLE_WEIGHT
                + pattern_confidence * CONFIDENCE_PATTERN_WEIGHT)
                .clamp(0.0, 1.0)
        };
        if confidence < self.min_confidence {
            return None;
        }

        let overall = self.summarize(outcomes);
        let mut deltas = BTreeMap::new();
        let mut reasoning = Vec::new();

        if overall.conversion_rate() < PATTERN_LOW_OVERALL_CONVERSION {
            deltas.insert(
                "initial_exploration_rate".to_string(),
                ADJUSTMENT_EXPLORATION_DELTA,
            );
            reasoning.push("Explore more: no offer converts well yet".to_string());
        }

        let by_kind = self.aggregate_outcomes(outcomes, |o| o.offer_kind.map(|k| k.to_string()));
        let mut weak_kinds: Vec<_> = by_kind
            .iter()
            .filter(|(_, s)| {
                s.total >= PATTERN_MIN_OUTCOMES_PER_OFFER
                    && s.conversion_rate() < PATTERN_LOW_OFFER_CONVERSION
            })
            .map(|(kind, _)| kind.clone())
            .collect();
        weak_kinds.sort();
        for kind in weak_kinds {
            deltas.insert(format!("rules.{kind}.bonus"), ADJUSTMENT_RULE_BONUS_DELTA);
            reasoning.push(format!("Lower heuristic bonus for {kind} offers"));
        }

        let average_reward = (overall.rewarded > 0).then(|| overall.average_reward());

        Some(ExplorationAdjustmentProposal {
            version: "0.1.0".to_string(),
            basis_policy: basis_policy.to_string(),
            ts: iso8601_now(),
            deltas,
            confidence,
            evidence: Evidence {
                outcomes_analyzed: outcomes.len(),
                conversion_rate: overall.conversion_rate(),
                average_reward,
                patterns: Some(patterns),
            },
            reasoning: Some(reasoning),
        })
    }
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn outcome(offer_id: &str, kind: OfferKind, converted: bool) -> OfferOutcome {
        OfferOutcome {
            offer_kind: Some(kind),
            ..OfferOutcome::new("u1", offer_id, converted, Some(if converted { 1.0 } else { 0.0 }))
        }
    }

    #[test]
    fn metrics_handle_empty_state() {
        let metrics = PersonalizationMetrics::default();
        assert_eq!(metrics.conversion_rate(), 0.0);
        assert_eq!(metrics.average_score(), 0.0);
    }

    #[test]
    fn metrics_track_rates_and_scores() {
        let mut metrics = PersonalizationMetrics::default();
        metrics.record_decision(Some(0.7));
        metrics.record_decision(None);
        metrics.record_decision(Some(0.9));
        metrics.record_decision(Some(f64::NAN));
        metrics.record_conversion();

        assert_eq!(metrics.total_decisions, 4);
        assert!((metrics.conversion_rate() - 0.25).abs() < 1e-12);
        assert!((metrics.average_score() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn statistics_ignore_non_finite_rewards() {
        let analyzer = FeedbackAnalyzer::default();
        let mut bad = outcome("o1", OfferKind::Bundle, true);
        bad.reward = Some(f64::INFINITY);
        let stats = analyzer.summarize(&[bad, outcome("o1", OfferKind::Bundle, false)]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.conversions, 1);
        assert_eq!(stats.rewarded, 1);
        assert_eq!(stats.average_reward(), 0.0);
    }

    #[test]
    fn aggregates_by_offer() {
        let analyzer = FeedbackAnalyzer::default();
        let outcomes = vec![
            outcome("o1001", OfferKind::Percentage, true),
            outcome("o1001", OfferKind::Percentage, false),
            outcome("o1004", OfferKind::FreeShipping, true),
        ];
        let by_offer = analyzer.aggregate_outcomes(&outcomes, |o| Some(o.offer_id.clone()));
        assert_eq!(by_offer.len(), 2);
        let stats = by_offer.get("o1001").expect("o1001 stats should exist");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.conversions, 1);
        assert!((stats.conversion_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn flags_low_converting_offer() {
        let analyzer = FeedbackAnalyzer::default();
        let mut outcomes: Vec<OfferOutcome> = (0..6)
            .map(|_| outcome("o1003", OfferKind::Bundle, false))
            .collect();
        outcomes.extend((0..6).map(|_| outcome("o1004", OfferKind::FreeShipping, true)));

        let patterns = analyzer.analyze_patterns(&outcomes);
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].contains("o1003"));
    }

    #[test]
    fn requires_minimum_outcomes() {
        let analyzer = FeedbackAnalyzer::new(10, 0.5);
        let outcomes = vec![
            outcome("o1001", OfferKind::Percentage, false),
            outcome("o1001", OfferKind::Percentage, false),
        ];
        assert!(analyzer.analyze_patterns(&outcomes).is_empty());
        assert!(analyzer.propose_adjustment("offer-agent", &outcomes).is_none());
    }

    #[test]
    fn proposes_more_exploration_and_lower_bonus() {
        let analyzer = FeedbackAnalyzer::new(10, 0.5);
        let mut outcomes: Vec<OfferOutcome> = (0..15)
            .map(|_| outcome("o1002", OfferKind::Fixed, false))
            .collect();
        outcomes.push(outcome("o1004", OfferKind::FreeShipping, true));

        let proposal = analyzer
            .propose_adjustment("offer-agent", &outcomes)
            .expect("proposal should exist");
        assert_eq!(proposal.basis_policy, "offer-agent");
        assert_eq!(proposal.evidence.outcomes_analyzed, 16);
        assert!(proposal.confidence >= 0.5);
        let exploration = proposal.deltas["initial_exploration_rate"];
        assert!((exploration - 0.05).abs() < 1e-12);
        assert!((proposal.deltas["rules.fixed.bonus"] + 0.05).abs() < 1e-12);
        assert!(!proposal.deltas.contains_key("rules.freeShipping.bonus"));
    }

    #[test]
    fn healthy_outcomes_produce_no_proposal() {
        let analyzer = FeedbackAnalyzer::default();
        let outcomes: Vec<OfferOutcome> = (0..20)
            .map(|i| outcome("o1004", OfferKind::FreeShipping, i % 2 == 0))
            .collect();
        assert!(analyzer.propose_adjustment("offer-agent", &outcomes).is_none());
    }

    #[test]
    fn reads_jsonl_and_reports_bad_line() {
        let input = "{\"ts\":\"2024-01-01T00:00:00Z\",\"user_id\":\"u\",\"offer_id\":\"o1001\",\"converted\":true}\n\n{oops}\n";
        let err = read_outcomes(input.as_bytes()).unwrap_err();
        assert!(matches!(err, FeedbackError::Parse { line: 3, .. }));

        let ok = read_outcomes(&input.as_bytes()[..input.find("\n\n").unwrap()]).unwrap();
        assert_eq!(ok.len(), 1);
        assert!(ok[0].converted);
        assert!(ok[0].reward.is_none());
    }

    #[test]
    fn fixture_outcomes_yield_a_proposal() {
        let jsonl = include_str!("../../../tests/fixtures/feedback/outcomes.ok.jsonl");
        let outcomes = read_outcomes(jsonl.as_bytes()).expect("fixture should parse");
        assert_eq!(outcomes.len(), 12);
        let proposal = FeedbackAnalyzer::default()
            .propose_adjustment("offer-agent-v1", &outcomes)
            .expect("fixture should trigger a proposal");
        assert!(proposal.deltas.contains_key("rules.bundle.bonus"));
    }

    #[test]
    fn fixture_proposal_deserializes() {
        let json = include_str!("../../../tests/fixtures/feedback/adjustment.ok.json");
        let proposal: ExplorationAdjustmentProposal =
            serde_json::from_str(json).expect("should deserialize fixture");
        assert_eq!(proposal.basis_policy, "offer-agent-v1");
        assert_eq!(proposal.deltas.len(), 2);
        assert_eq!(proposal.deltas.get("rules.bundle.bonus"), Some(&-0.05));
        assert_eq!(proposal.evidence.average_reward, Some(0.31));
    }
}
