//! Einstellbare Parameter des Angebots-Agenten.
//!
//! Jedes Feld hat einen Default; ein leeres JSON-Objekt ist eine gültige
//! Konfiguration.

use crate::error::{BanditError, Result};
use crate::reward::RewardRates;
use crate::scorer::{default_rules, HeuristicRule};
use kauflern_core::HIGH_VALUE_THRESHOLD;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Explorationsrate ε vor der ersten Belohnung.
    pub initial_exploration_rate: f64,
    /// Faktor, mit dem ε bei jeder Belohnung abklingt.
    pub exploration_decay: f64,
    /// Untergrenze für ε.
    pub min_exploration_rate: f64,
    /// Glättungsfaktor λ der Belohnungsschätzung.
    pub learning_rate: f64,
    /// Grundscore jedes Angebots vor den Heuristiken.
    pub base_score: f64,
    /// Gewicht der gelernten Schätzung im Score.
    pub reward_weight: f64,
    /// Umsatzgrenze (exklusiv), ab der ein Kunde als hochwertig gilt.
    pub high_value_threshold: f64,
    pub rules: Vec<HeuristicRule>,
    pub reward_rates: RewardRates,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            initial_exploration_rate: 0.10,
            exploration_decay: 0.995,
            min_exploration_rate: 0.01,
            learning_rate: 0.15,
            base_score: 0.5,
            reward_weight: 0.3,
            high_value_threshold: HIGH_VALUE_THRESHOLD,
            rules: default_rules(),
            reward_rates: RewardRates::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        unit_interval("initial_exploration_rate", self.initial_exploration_rate)?;
        unit_interval("min_exploration_rate", self.min_exploration_rate)?;
        unit_interval("learning_rate", self.learning_rate)?;
        if !(self.exploration_decay > 0.0 && self.exploration_decay <= 1.0) {
            return Err(invalid(format!(
                "exploration_decay must be in (0, 1], got {}",
                self.exploration_decay
            )));
        }
        if self.min_exploration_rate > self.initial_exploration_rate {
            return Err(invalid(format!(
                "min_exploration_rate ({}) exceeds initial_exploration_rate ({})",
                self.min_exploration_rate, self.initial_exploration_rate
            )));
        }
        for (name, value) in [
            ("base_score", self.base_score),
            ("reward_weight", self.reward_weight),
            ("high_value_threshold", self.high_value_threshold),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be finite, got {value}")));
            }
        }
        if let Some(rule) = self.rules.iter().find(|r| !r.bonus.is_finite()) {
            return Err(invalid(format!(
                "rule bonus for {} must be finite, got {}",
                rule.kind, rule.bonus
            )));
        }
        self.reward_rates.validate()
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be in [0, 1], got {value}")))
    }
}

fn invalid(msg: String) -> BanditError {
    BanditError::InvalidConfig(msg)
}
