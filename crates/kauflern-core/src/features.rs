//! Ableitung eines normierten Feature-Snapshots aus dem [`UserContext`].

use crate::context::{HistoryAction, UserContext};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Platzhalter für "kein Kauf bekannt" in [`CustomerFeatures::last_purchase_days`].
pub const NO_PURCHASE_SENTINEL: i64 = 999;

/// Umsatzgrenze (exklusiv), ab der ein Kunde als hochwertig gilt.
pub const HIGH_VALUE_THRESHOLD: f64 = 200.0;

const MILLIS_PER_DAY: i128 = 86_400_000;

/// Punktuelle Zusammenfassung eines Kunden für das Scoring.
///
/// Wird bei jeder Entscheidung neu berechnet und nie zwischengespeichert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFeatures {
    pub is_returning_customer: bool,
    pub is_high_value: bool,
    /// Stunde `0..=23` (UTC) zum Zeitpunkt der Anfrage.
    pub time_of_day: u8,
    /// Wochentag `0..=6`, Sonntag = 0.
    pub day_of_week: u8,
    pub device_type: String,
    pub location: String,
    /// Ganze Tage seit dem letzten Kauf, [`NO_PURCHASE_SENTINEL`] ohne Kauf.
    /// `None`, wenn der letzte Kauf keinen lesbaren Zeitstempel hat; das gilt
    /// weder als frisch noch als überfällig.
    pub last_purchase_days: Option<i64>,
    pub cart_value: f64,
    pub viewed_products: f64,
}

impl CustomerFeatures {
    pub fn has_purchase_history(&self) -> bool {
        self.last_purchase_days != Some(NO_PURCHASE_SENTINEL)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    high_value_threshold: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            high_value_threshold: HIGH_VALUE_THRESHOLD,
        }
    }
}

impl FeatureExtractor {
    pub fn new(high_value_threshold: f64) -> Self {
        Self { high_value_threshold }
    }

    /// Wie [`extract_at`](Self::extract_at), mit der aktuellen Uhrzeit.
    pub fn extract(&self, ctx: &UserContext) -> CustomerFeatures {
        self.extract_at(ctx, OffsetDateTime::now_utc())
    }

    /// Baut den Snapshot relativ zu `now`. Scheitert nie: fehlende Felder
    /// bekommen ihre Defaults (`desktop`, `unknown`, `0`).
    pub fn extract_at(&self, ctx: &UserContext, now: OffsetDateTime) -> CustomerFeatures {
        CustomerFeatures {
            is_returning_customer: ctx.has_history(),
            is_high_value: total_spent(&ctx.history) > self.high_value_threshold,
            time_of_day: now.hour(),
            day_of_week: now.weekday().number_days_from_sunday(),
            device_type: non_empty_or(ctx.device_type.as_deref(), "desktop"),
            location: non_empty_or(ctx.location.as_deref(), "unknown"),
            last_purchase_days: last_purchase_days(&ctx.history, now),
            cart_value: finite_or_zero(ctx.cart_value),
            viewed_products: finite_or_zero(ctx.viewed_products),
        }
    }
}

/// Summe aller Kaufwerte; andere Aktionen zählen nicht.
pub fn total_spent(history: &[HistoryAction]) -> f64 {
    history.iter().map(HistoryAction::purchase_value).sum()
}

/// Tage seit dem *letzten Kauf in Listenreihenfolge*, nicht seit dem
/// chronologisch jüngsten. Ohne Kauf [`NO_PURCHASE_SENTINEL`], bei
/// fehlendem oder unlesbarem Zeitstempel `None`.
pub fn last_purchase_days(history: &[HistoryAction], now: OffsetDateTime) -> Option<i64> {
    let Some(last) = history.iter().rev().find(|a| a.is_purchase()) else {
        return Some(NO_PURCHASE_SENTINEL);
    };
    let at = last.timestamp.as_ref().and_then(|ts| ts.resolve())?;
    let elapsed_ms = (now - at).whole_milliseconds();
    i64::try_from(elapsed_ms.div_euclid(MILLIS_PER_DAY)).ok()
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}
