#![warn(clippy::unwrap_used, clippy::expect_used)]

//! ε-greedy Angebotsauswahl mit heuristischem Scoring und gelernter
//! Belohnungshistorie.
//!
//! Der [`OfferAgent`] implementiert das [`Policy`]-Trait aus `kauflern-core`.
//! Mit Wahrscheinlichkeit ε wählt er ein zufälliges Angebot, andernfalls das
//! Angebot mit dem höchsten Score aus [`OfferScorer`]. Jedes Feedback glättet
//! die Schätzung für das Paar (Kunde, Angebot) und lässt ε abklingen.
//!
//! Der gesamte lernende Zustand gehört der Agent-Instanz; für parallele
//! Zugriffe gibt es [`SharedAgent`].

pub mod config;
pub mod error;
pub mod explain;
pub mod learner;
pub mod preferences;
pub mod reward;
pub mod scorer;
pub mod shared;

pub use config::AgentConfig;
pub use error::{BanditError, Result};
pub use learner::{ExplorationSchedule, RewardLearner};
pub use preferences::{PreferenceRecord, PreferenceStore};
pub use reward::{RewardCalculator, RewardRates};
pub use scorer::{default_rules, FeatureCondition, HeuristicRule, OfferScorer};
pub use shared::SharedAgent;

use kauflern_core::{
    CustomerFeatures, Decision, DecisionMode, FeatureExtractor, Offer, Policy, UserContext,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Lernender Entscheider für Angebote.
#[derive(Debug)]
pub struct OfferAgent<R = StdRng> {
    config: AgentConfig,
    extractor: FeatureExtractor,
    preferences: PreferenceStore,
    scorer: OfferScorer,
    learner: RewardLearner,
    calculator: RewardCalculator,
    rng: R,
}

impl Default for OfferAgent<StdRng> {
    fn default() -> Self {
        Self::build(AgentConfig::default(), StdRng::from_entropy())
    }
}

impl OfferAgent<StdRng> {
    /// Agent mit Zufallsquelle aus System-Entropie.
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Reproduzierbarer Agent, z. B. für Tests und Simulationen.
    pub fn seeded(config: AgentConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> OfferAgent<R> {
    pub fn with_rng(config: AgentConfig, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, rng))
    }

    fn build(config: AgentConfig, rng: R) -> Self {
        let exploration = ExplorationSchedule::new(
            config.initial_exploration_rate,
            config.exploration_decay,
            config.min_exploration_rate,
        );
        Self {
            extractor: FeatureExtractor::new(config.high_value_threshold),
            preferences: PreferenceStore::new(),
            scorer: OfferScorer::new(config.rules.clone(), config.base_score, config.reward_weight),
            learner: RewardLearner::new(config.learning_rate, exploration),
            calculator: RewardCalculator::new(config.reward_rates),
            config,
            rng,
        }
    }

    /// Trifft eine Entscheidung relativ zum Zeitpunkt `now`.
    ///
    /// Schlägt nur fehl, wenn `offers` leer ist.
    pub fn decide_at(
        &mut self,
        user_id: &str,
        offers: &[Offer],
        ctx: &UserContext,
        now: OffsetDateTime,
    ) -> Result<Decision> {
        if offers.is_empty() {
            return Err(BanditError::EmptyCatalog);
        }
        let features = self.extractor.extract_at(ctx, now);
        self.preferences.record_contact(user_id, &features, now);

        let explore = self.rng.gen::<f64>() < self.learner.exploration_rate();
        let (offer, score, mode) = if explore {
            let offer = offers
                .choose(&mut self.rng)
                .ok_or(BanditError::EmptyCatalog)?;
            (offer, None, DecisionMode::Explore)
        } else {
            let (offer, score) = self
                .scorer
                .choose_best(user_id, offers, &features, &self.learner)
                .ok_or(BanditError::EmptyCatalog)?;
            (offer, Some(score), DecisionMode::Exploit)
        };

        debug!(
            user_id,
            offer_id = %offer.id,
            ?mode,
            ?score,
            exploration_rate = self.learner.exploration_rate(),
            "offer chosen"
        );

        Ok(Decision {
            offer: offer.clone(),
            mode,
            score,
            channel: explain::select_channel(ctx),
            factors: explain::personalization_factors(ctx, &features, offer),
            features,
        })
    }

    /// Nur das gewählte Angebot.
    pub fn choose_offer(&mut self, user_id: &str, offers: &[Offer], ctx: &UserContext) -> Result<Offer> {
        self.decide_at(user_id, offers, ctx, OffsetDateTime::now_utc())
            .map(|d| d.offer)
    }

    /// Verbucht eine Belohnung für (Kunde, Angebot) und lässt ε abklingen.
    ///
    /// Unbekannte Angebote starten bei `0`. Nicht-endliche Belohnungen werden
    /// abgelehnt und ändern nichts. Gibt die neue Schätzung zurück.
    pub fn update_offer_performance(&mut self, user_id: &str, offer_id: &str, reward: f64) -> Result<f64> {
        if !reward.is_finite() {
            warn!(user_id, offer_id, reward, "rejecting non-finite reward");
            return Err(BanditError::NonFiniteReward(reward));
        }
        Ok(self.learner.update_estimate(user_id, offer_id, reward))
    }

    /// Belohnung für ein beobachtetes Ergebnis, siehe [`RewardCalculator`].
    pub fn compute_reward(&self, outcome: &UserContext) -> f64 {
        self.calculator.compute_reward(outcome)
    }

    pub fn score_offer(&self, user_id: &str, offer: &Offer, features: &CustomerFeatures) -> f64 {
        self.scorer.score(user_id, offer, features, &self.learner)
    }

    pub fn exploration_rate(&self) -> f64 {
        self.learner.exploration_rate()
    }

    pub fn reward_estimate(&self, user_id: &str, offer_id: &str) -> Option<f64> {
        self.learner.lookup(user_id, offer_id)
    }

    pub fn personalization_score(&self, user_id: &str, offer_id: &str) -> Option<f64> {
        self.scorer.personalization_score(user_id, offer_id)
    }

    pub fn learner(&self) -> &RewardLearner {
        &self.learner
    }

    pub fn scorer(&self) -> &OfferScorer {
        &self.scorer
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EstimateEntry {
    user_id: String,
    offer_id: String,
    estimate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScoreEntry {
    user_id: String,
    offer_id: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct AgentSnapshot {
    exploration_rate: Option<f64>,
    #[serde(default)]
    estimates: Vec<EstimateEntry>,
    #[serde(default)]
    preferences: HashMap<String, PreferenceRecord>,
    #[serde(default)]
    personalization_scores: Vec<ScoreEntry>,
}

impl<R: Rng> Policy for OfferAgent<R> {
    type Error = BanditError;

    fn decide(&mut self, user_id: &str, offers: &[Offer], ctx: &UserContext) -> Result<Decision> {
        self.decide_at(user_id, offers, ctx, OffsetDateTime::now_utc())
    }

    fn feedback(&mut self, user_id: &str, offer_id: &str, reward: f64) -> Result<()> {
        self.update_offer_performance(user_id, offer_id, reward).map(|_| ())
    }

    /// Persistiert ε, Schätzungen, Präferenzen und Score-Log als JSON.
    fn snapshot(&self) -> Value {
        let estimates: Vec<EstimateEntry> = self
            .learner
            .estimates()
            .map(|(user, offer, estimate)| EstimateEntry {
                user_id: user.to_string(),
                offer_id: offer.to_string(),
                estimate,
            })
            .collect();
        let scores: Vec<ScoreEntry> = self
            .scorer
            .score_log()
            .map(|(user, offer, score)| ScoreEntry {
                user_id: user.to_string(),
                offer_id: offer.to_string(),
                score,
            })
            .collect();
        let preferences: HashMap<&str, &PreferenceRecord> = self.preferences.iter().collect();
        json!({
            "exploration_rate": self.learner.exploration_rate(),
            "estimates": estimates,
            "preferences": preferences,
            "personalization_scores": scores,
        })
    }

    /// Ersetzt den gelernten Zustand durch einen Snapshot.
    ///
    /// ε wird auf `[min_exploration_rate, 1]` begrenzt; fehlt ε im Snapshot,
    /// gilt wieder `initial_exploration_rate`. Nicht-endliche Schätzungen
    /// werden verworfen.
    fn load(&mut self, snapshot: Value) -> Result<()> {
        let snap: AgentSnapshot = serde_json::from_value(snapshot)?;

        self.learner.clear();
        match snap.exploration_rate {
            Some(rate) => self.learner.restore_exploration(rate),
            None => self
                .learner
                .reset_exploration(self.config.initial_exploration_rate),
        }
        for entry in snap.estimates {
            if entry.estimate.is_finite() {
                self.learner
                    .restore_estimate(entry.user_id, entry.offer_id, entry.estimate);
            } else {
                warn!(
                    user_id = %entry.user_id,
                    offer_id = %entry.offer_id,
                    "dropping non-finite estimate from snapshot"
                );
            }
        }

        self.scorer.clear_log();
        for entry in snap.personalization_scores {
            if entry.score.is_finite() {
                self.scorer.log_score(&entry.user_id, &entry.offer_id, entry.score);
            }
        }

        self.preferences.replace(snap.preferences);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kauflern_core::{default_catalog, Channel, HistoryAction, OfferKind};
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2024-06-12 10:00 UTC);

    fn exploit_only() -> AgentConfig {
        AgentConfig {
            initial_exploration_rate: 0.0,
            min_exploration_rate: 0.0,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn exploit_picks_percentage_for_new_customer() {
        let mut agent = OfferAgent::seeded(exploit_only(), 7).unwrap();
        let d = agent
            .decide_at("u1", &default_catalog(), &UserContext::default(), NOW)
            .unwrap();
        assert_eq!(d.mode, DecisionMode::Exploit);
        assert_eq!(d.offer.kind, OfferKind::Percentage);
        assert!((d.score.unwrap() - 0.70).abs() < 1e-12);
        assert_eq!(d.channel, Channel::Email);
        assert_eq!(agent.personalization_score("u1", "o1001"), d.score);
        assert!(agent.preferences().get("u1").is_some());
    }

    #[test]
    fn exploit_picks_fixed_for_lapsed_high_value_customer() {
        let mut agent = OfferAgent::seeded(exploit_only(), 7).unwrap();
        let ctx = UserContext {
            history: vec![
                HistoryAction::purchase(150.0, NOW - Duration::days(60)),
                HistoryAction::purchase(150.0, NOW - Duration::days(45)),
            ],
            ..UserContext::default()
        };
        let d = agent.decide_at("u1", &default_catalog(), &ctx, NOW).unwrap();
        assert_eq!(d.offer.kind, OfferKind::Fixed);
        assert!((d.score.unwrap() - 0.85).abs() < 1e-12);
    }

    #[test]
    fn empty_catalog_fails_fast() {
        let mut agent = OfferAgent::seeded(AgentConfig::default(), 1).unwrap();
        let err = agent
            .decide_at("u1", &[], &UserContext::default(), NOW)
            .unwrap_err();
        assert!(matches!(err, BanditError::EmptyCatalog));
        assert!(agent.preferences().is_empty());
    }

    #[test]
    fn non_finite_reward_is_rejected_without_side_effects() {
        let mut agent = OfferAgent::seeded(AgentConfig::default(), 1).unwrap();
        let err = agent
            .update_offer_performance("u1", "o1001", f64::NAN)
            .unwrap_err();
        assert!(matches!(err, BanditError::NonFiniteReward(_)));
        assert_eq!(agent.reward_estimate("u1", "o1001"), None);
        assert!((agent.exploration_rate() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn learned_reward_can_flip_the_exploit_choice() {
        let mut agent = OfferAgent::seeded(exploit_only(), 3).unwrap();
        let catalog = default_catalog();
        for _ in 0..20 {
            agent.update_offer_performance("u1", "o1003", 1.0).unwrap();
        }
        // bundle: 0.5 + ~0.96 * 0.3 > 0.7
        let d = agent
            .decide_at("u1", &catalog, &UserContext::default(), NOW)
            .unwrap();
        assert_eq!(d.offer.id, "o1003");
        // ein anderer Kunde bekommt weiter den heuristischen Sieger
        let d = agent
            .decide_at("u2", &catalog, &UserContext::default(), NOW)
            .unwrap();
        assert_eq!(d.offer.id, "o1001");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AgentConfig {
            learning_rate: -0.1,
            ..AgentConfig::default()
        };
        assert!(matches!(
            OfferAgent::seeded(config, 0),
            Err(BanditError::InvalidConfig(_))
        ));
    }

    #[test]
    fn snapshot_roundtrip_restores_learned_state() {
        let mut agent = OfferAgent::seeded(exploit_only(), 11).unwrap();
        agent
            .decide_at("u1", &default_catalog(), &UserContext::default(), NOW)
            .unwrap();
        agent.update_offer_performance("u1", "o1001", 1.0).unwrap();
        agent.update_offer_performance("u2", "o1004", 0.4).unwrap();
        let snap = agent.snapshot();

        let mut restored = OfferAgent::seeded(exploit_only(), 99).unwrap();
        restored.load(snap).unwrap();
        assert_eq!(restored.reward_estimate("u1", "o1001"), Some(0.15));
        assert_eq!(restored.reward_estimate("u2", "o1004"), agent.reward_estimate("u2", "o1004"));
        let logged = restored.personalization_score("u1", "o1001").unwrap();
        assert!((logged - 0.7).abs() < 1e-12);
        assert_eq!(
            restored.preferences().get("u1"),
            agent.preferences().get("u1")
        );
        assert_eq!(restored.exploration_rate(), agent.exploration_rate());
    }

    #[test]
    fn load_clamps_rate_and_replaces_state() {
        let mut agent = OfferAgent::seeded(AgentConfig::default(), 5).unwrap();
        agent.update_offer_performance("u9", "o1002", 1.0).unwrap();

        agent
            .load(json!({
                "exploration_rate": 7.5,
                "estimates": [{"user_id": "u1", "offer_id": "o1", "estimate": 0.4}]
            }))
            .unwrap();
        assert_eq!(agent.exploration_rate(), 1.0);
        assert_eq!(agent.reward_estimate("u1", "o1"), Some(0.4));
        assert_eq!(agent.reward_estimate("u9", "o1002"), None);

        agent.load(json!({"exploration_rate": 0.0})).unwrap();
        assert_eq!(agent.exploration_rate(), 0.01);
        assert_eq!(agent.reward_estimate("u1", "o1"), None);
    }

    #[test]
    fn load_without_rate_resets_exploration_to_initial() {
        let mut agent = OfferAgent::seeded(AgentConfig::default(), 5).unwrap();
        for _ in 0..50 {
            agent.update_offer_performance("u1", "o1002", 1.0).unwrap();
        }
        assert!(agent.exploration_rate() < 0.10);

        agent
            .load(json!({"estimates": [{"user_id": "u2", "offer_id": "o1001", "estimate": 0.3}]}))
            .unwrap();
        assert!((agent.exploration_rate() - 0.10).abs() < 1e-12);
        assert_eq!(agent.reward_estimate("u1", "o1002"), None);
        assert_eq!(agent.reward_estimate("u2", "o1001"), Some(0.3));
    }

    #[test]
    fn unknown_purchase_date_is_not_treated_as_lapsed() {
        let mut agent = OfferAgent::seeded(exploit_only(), 7).unwrap();
        let ctx = UserContext {
            history: vec![HistoryAction {
                r#type: "purchase".into(),
                value: Some(50.0),
                timestamp: None,
            }],
            ..UserContext::default()
        };
        let catalog = default_catalog();
        let d = agent.decide_at("u1", &catalog, &ctx, NOW).unwrap();
        assert_eq!(d.features.last_purchase_days, None);

        let scores: Vec<f64> = catalog
            .iter()
            .map(|o| agent.score_offer("u1", o, &d.features))
            .collect();
        let expected = [0.5, 0.5, 0.5, 0.6];
        for (score, want) in scores.iter().zip(expected) {
            assert!((score - want).abs() < 1e-12, "{scores:?}");
        }
        assert_eq!(d.offer.id, "o1004");
    }

    #[test]
    fn load_rejects_malformed_snapshot() {
        let mut agent = OfferAgent::seeded(AgentConfig::default(), 5).unwrap();
        let err = agent.load(json!({"estimates": "nope"})).unwrap_err();
        assert!(matches!(err, BanditError::Snapshot(_)));

        let err = agent
            .load(json!({"estimates": [{"user_id": "u", "offer_id": "o", "estimate": null}]}))
            .unwrap_err();
        assert!(matches!(err, BanditError::Snapshot(_)));
    }

    #[test]
    fn compute_reward_uses_configured_rates() {
        let agent = OfferAgent::seeded(AgentConfig::default(), 5).unwrap();
        let outcome = UserContext {
            conversion: true,
            ..UserContext::default()
        };
        assert!((agent.compute_reward(&outcome) - 1.0).abs() < 1e-12);
    }
}
