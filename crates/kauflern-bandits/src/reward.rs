//! Macht aus einem beobachteten Ergebnis eine skalare Belohnung.

use crate::error::{BanditError, Result};
use kauflern_core::UserContext;
use serde::{Deserialize, Serialize};

/// Gewichte je Signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardRates {
    pub conversion: f64,
    /// Zusatz, wenn ein Kunde mit Historie erneut kauft.
    pub repeat: f64,
    /// Je Sekunde Verweildauer.
    pub time_spent: f64,
    pub engagement: f64,
    pub satisfaction: f64,
}

impl Default for RewardRates {
    fn default() -> Self {
        Self {
            conversion: 1.0,
            repeat: 0.5,
            time_spent: 0.1,
            engagement: 0.2,
            satisfaction: 0.3,
        }
    }
}

impl RewardRates {
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.conversion,
            self.repeat,
            self.time_spent,
            self.engagement,
            self.satisfaction,
        ];
        if all.iter().all(|r| r.is_finite()) {
            Ok(())
        } else {
            Err(BanditError::InvalidConfig(format!(
                "reward rates must be finite: {self:?}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RewardCalculator {
    rates: RewardRates,
}

impl RewardCalculator {
    pub fn new(rates: RewardRates) -> Self {
        Self { rates }
    }

    /// Summe über die vorhandenen Signale, ohne Begrenzung. Fehlende oder
    /// nicht-endliche Signale zählen nicht.
    pub fn compute_reward(&self, outcome: &UserContext) -> f64 {
        let mut reward = 0.0;
        if outcome.conversion {
            reward += self.rates.conversion;
            if outcome.has_history() {
                reward += self.rates.repeat;
            }
        }
        reward += signal(outcome.time_spent) / 1000.0 * self.rates.time_spent;
        reward += signal(outcome.engagement) * self.rates.engagement;
        reward += signal(outcome.satisfaction) * self.rates.satisfaction;
        reward
    }
}

fn signal(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kauflern_core::HistoryAction;
    use time::macros::datetime;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn no_signals_give_zero_reward() {
        assert_eq!(RewardCalculator::default().compute_reward(&UserContext::default()), 0.0);
    }

    #[test]
    fn conversion_without_history_earns_base_reward() {
        let ctx = UserContext {
            conversion: true,
            ..UserContext::default()
        };
        assert!(approx(RewardCalculator::default().compute_reward(&ctx), 1.0));
    }

    #[test]
    fn repeat_purchase_bonus_requires_history() {
        let ctx = UserContext {
            conversion: true,
            history: vec![HistoryAction::purchase(20.0, datetime!(2024-01-01 00:00 UTC))],
            ..UserContext::default()
        };
        assert!(approx(RewardCalculator::default().compute_reward(&ctx), 1.5));

        let no_conversion = UserContext {
            conversion: false,
            ..ctx
        };
        assert!(approx(
            RewardCalculator::default().compute_reward(&no_conversion),
            0.0
        ));
    }

    #[test]
    fn soft_signals_are_weighted_and_summed() {
        let ctx = UserContext {
            time_spent: Some(30_000.0),
            engagement: Some(0.5),
            satisfaction: Some(1.0),
            ..UserContext::default()
        };
        // 30 s * 0.1 + 0.5 * 0.2 + 1.0 * 0.3
        assert!(approx(RewardCalculator::default().compute_reward(&ctx), 3.4));
    }

    #[test]
    fn non_finite_signals_are_ignored() {
        let ctx = UserContext {
            engagement: Some(f64::NAN),
            satisfaction: Some(0.5),
            ..UserContext::default()
        };
        assert!(approx(RewardCalculator::default().compute_reward(&ctx), 0.15));
    }

    #[test]
    fn custom_rates_apply() {
        let calc = RewardCalculator::new(RewardRates {
            conversion: 2.0,
            ..RewardRates::default()
        });
        let ctx = UserContext {
            conversion: true,
            ..UserContext::default()
        };
        assert!(approx(calc.compute_reward(&ctx), 2.0));
    }
}
