//! Angebots-Scoring: fester Grundwert, eine deklarative Tabelle heuristischer
//! Boni je Angebotsart und die gelernte Belohnungsschätzung.

use crate::learner::RewardLearner;
use kauflern_core::{CustomerFeatures, Offer, OfferKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bedingung über die Features, unter der eine Regel greift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCondition {
    ReturningCustomer,
    NewCustomer,
    HighValue,
    /// Mehr als `days` Tage seit dem letzten Kauf. Der Platzhalter 999
    /// (kein Kauf) zählt als überfällig, ein unbekanntes Kaufdatum nicht.
    LapsedPurchase { days: i64 },
    CartValueAbove { value: f64 },
}

impl FeatureCondition {
    pub fn matches(&self, features: &CustomerFeatures) -> bool {
        match *self {
            Self::ReturningCustomer => features.is_returning_customer,
            Self::NewCustomer => !features.is_returning_customer,
            Self::HighValue => features.is_high_value,
            Self::LapsedPurchase { days } => features.last_purchase_days.is_some_and(|d| d > days),
            Self::CartValueAbove { value } => features.cart_value > value,
        }
    }
}

/// `bonus` zählt für jedes Angebot der Art `kind`, sofern `when` gilt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicRule {
    pub when: FeatureCondition,
    pub kind: OfferKind,
    pub bonus: f64,
}

impl HeuristicRule {
    pub const fn new(when: FeatureCondition, kind: OfferKind, bonus: f64) -> Self {
        Self { when, kind, bonus }
    }

    pub fn applies(&self, offer: &Offer, features: &CustomerFeatures) -> bool {
        offer.kind == self.kind && self.when.matches(features)
    }
}

/// Die fünf Regeln des Standardkatalogs.
pub fn default_rules() -> Vec<HeuristicRule> {
    use FeatureCondition::*;
    vec![
        HeuristicRule::new(ReturningCustomer, OfferKind::FreeShipping, 0.10),
        HeuristicRule::new(HighValue, OfferKind::Fixed, 0.15),
        HeuristicRule::new(LapsedPurchase { days: 30 }, OfferKind::Fixed, 0.20),
        HeuristicRule::new(NewCustomer, OfferKind::Percentage, 0.20),
        HeuristicRule::new(CartValueAbove { value: 50.0 }, OfferKind::Bundle, 0.15),
    ]
}

#[derive(Debug, Clone)]
pub struct OfferScorer {
    rules: Vec<HeuristicRule>,
    base_score: f64,
    reward_weight: f64,
    /// Letzter Exploit-Score je Kunde und Angebot. Nur zur Beobachtung, die
    /// Entscheidung liest ihn nie.
    score_log: HashMap<String, HashMap<String, f64>>,
}

impl OfferScorer {
    pub fn new(rules: Vec<HeuristicRule>, base_score: f64, reward_weight: f64) -> Self {
        Self {
            rules,
            base_score,
            reward_weight,
            score_log: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &[HeuristicRule] {
        &self.rules
    }

    /// Summe der Boni aller passenden Regeln.
    pub fn heuristic_bonus(&self, offer: &Offer, features: &CustomerFeatures) -> f64 {
        self.rules
            .iter()
            .filter(|r| r.applies(offer, features))
            .map(|r| r.bonus)
            .sum()
    }

    /// Affinität von `user_id` zu `offer`, immer in `[0, 1]`.
    pub fn score(
        &self,
        user_id: &str,
        offer: &Offer,
        features: &CustomerFeatures,
        learner: &RewardLearner,
    ) -> f64 {
        let total = self.base_score
            + self.heuristic_bonus(offer, features)
            + learner.estimate(user_id, &offer.id) * self.reward_weight;
        // max vor min: NaN landet bei 0
        total.max(0.0).min(1.0)
    }

    /// Angebot mit dem höchsten Score; bei Gleichstand das erste. Protokolliert
    /// den Siegerscore.
    pub fn choose_best<'a>(
        &mut self,
        user_id: &str,
        offers: &'a [Offer],
        features: &CustomerFeatures,
        learner: &RewardLearner,
    ) -> Option<(&'a Offer, f64)> {
        let mut best: Option<(&'a Offer, f64)> = None;
        for offer in offers {
            let score = self.score(user_id, offer, features, learner);
            if best.map_or(true, |(_, highest)| score > highest) {
                best = Some((offer, score));
            }
        }
        if let Some((offer, score)) = best {
            self.log_score(user_id, &offer.id, score);
        }
        best
    }

    pub fn personalization_score(&self, user_id: &str, offer_id: &str) -> Option<f64> {
        self.score_log.get(user_id)?.get(offer_id).copied()
    }

    /// Alle protokollierten Scores als `(user_id, offer_id, score)`.
    pub fn score_log(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.score_log.iter().flat_map(|(user, offers)| {
            offers
                .iter()
                .map(move |(offer, score)| (user.as_str(), offer.as_str(), *score))
        })
    }

    pub(crate) fn log_score(&mut self, user_id: &str, offer_id: &str, score: f64) {
        self.score_log
            .entry(user_id.to_string())
            .or_default()
            .insert(offer_id.to_string(), score);
    }

    pub(crate) fn clear_log(&mut self) {
        self.score_log.clear();
    }
}
