//! Belohnungslernen: exponentiell geglättete Schätzungen je Kunde und
//! Angebot sowie die gemeinsame Explorationsrate, die mit jeder Belohnung
//! abklingt.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Prozessweite Explorationsrate ε mit multiplikativem Abklingen und Untergrenze.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplorationSchedule {
    rate: f64,
    decay: f64,
    floor: f64,
}

impl ExplorationSchedule {
    pub fn new(initial: f64, decay: f64, floor: f64) -> Self {
        Self {
            rate: initial.max(floor),
            decay,
            floor,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// `rate = max(floor, rate * decay)`; steigt nie.
    pub fn decay(&mut self) {
        self.rate = (self.rate * self.decay).max(self.floor);
    }

    /// Übernimmt die Rate aus einem Snapshot, begrenzt auf `[floor, 1]`.
    pub(crate) fn restore(&mut self, rate: f64) {
        if rate.is_finite() {
            self.rate = rate.clamp(self.floor, 1.0);
        }
    }

    /// Zurück auf den Startwert, wie bei [`new`](Self::new).
    pub(crate) fn reset(&mut self, initial: f64) {
        self.rate = initial.max(self.floor);
    }
}

#[derive(Debug, Clone)]
pub struct RewardLearner {
    learning_rate: f64,
    estimates: HashMap<String, HashMap<String, f64>>,
    exploration: ExplorationSchedule,
}

impl RewardLearner {
    pub fn new(learning_rate: f64, exploration: ExplorationSchedule) -> Self {
        Self {
            learning_rate,
            estimates: HashMap::new(),
            exploration,
        }
    }

    /// Aktuelle Schätzung, `0` für nie beobachtete Paare.
    pub fn estimate(&self, user_id: &str, offer_id: &str) -> f64 {
        self.lookup(user_id, offer_id).unwrap_or(0.0)
    }

    /// Wie [`estimate`](Self::estimate), unterscheidet aber "nie beobachtet".
    pub fn lookup(&self, user_id: &str, offer_id: &str) -> Option<f64> {
        self.estimates.get(user_id)?.get(offer_id).copied()
    }

    /// Rechnet `neu = alt * (1 - λ) + reward * λ` und lässt ε einmal
    /// abklingen. Gibt die neue Schätzung zurück.
    pub fn update_estimate(&mut self, user_id: &str, offer_id: &str, reward: f64) -> f64 {
        let lambda = self.learning_rate;
        let slot = self
            .estimates
            .entry(user_id.to_string())
            .or_default()
            .entry(offer_id.to_string())
            .or_insert(0.0);
        *slot = *slot * (1.0 - lambda) + reward * lambda;
        let updated = *slot;
        self.decay_exploration();
        debug!(
            user_id,
            offer_id,
            estimate = updated,
            exploration_rate = self.exploration.rate(),
            "reward estimate updated"
        );
        updated
    }

    pub fn decay_exploration(&mut self) {
        self.exploration.decay();
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration.rate()
    }

    pub fn exploration(&self) -> &ExplorationSchedule {
        &self.exploration
    }

    /// Alle Schätzungen als `(user_id, offer_id, estimate)`.
    pub fn estimates(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.estimates.iter().flat_map(|(user, offers)| {
            offers
                .iter()
                .map(move |(offer, value)| (user.as_str(), offer.as_str(), *value))
        })
    }

    pub fn user_estimates(&self, user_id: &str) -> Option<&HashMap<String, f64>> {
        self.estimates.get(user_id)
    }

    pub(crate) fn restore_estimate(&mut self, user_id: String, offer_id: String, value: f64) {
        self.estimates.entry(user_id).or_default().insert(offer_id, value);
    }

    pub(crate) fn restore_exploration(&mut self, rate: f64) {
        self.exploration.restore(rate);
    }

    pub(crate) fn reset_exploration(&mut self, initial: f64) {
        self.exploration.reset(initial);
    }

    pub(crate) fn clear(&mut self) {
        self.estimates.clear();
    }
}
