//! Rohsignale eines Kunden, wie sie der Service-Layer pro Anfrage mitliefert.
//!
//! Der [`UserContext`] ist bewusst tolerant: kein Feld ist Pflicht, fehlende
//! Werte werden beim Ableiten der Features durch dokumentierte Defaults
//! ersetzt. Die JSON-Namen folgen dem camelCase-Format des Dashboards
//! (`timeSpent`, `cartValue`, ...).

use serde::{Deserialize, Deserializer, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Aktionstyp, der als Kauf zählt.
pub const PURCHASE: &str = "purchase";

/// Kontext einer einzelnen Entscheidungs- oder Feedback-Anfrage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserContext {
    /// Bisherige Aktionen des Kunden in der vom Aufrufer gelieferten Reihenfolge.
    #[serde(deserialize_with = "null_as_empty")]
    pub history: Vec<HistoryAction>,
    /// Verweildauer in Millisekunden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<f64>,
    /// Engagement, vom Aufrufer auf `0..1` normiert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement: Option<f64>,
    /// Zufriedenheit, vom Aufrufer auf `0..1` normiert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<f64>,
    /// Ob die Interaktion zu einem Kauf geführt hat.
    pub conversion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewed_products: Option<f64>,
    /// Kunde ist auf einem Mobilgerät unterwegs (Kanalwahl: SMS).
    pub mobile: bool,
    /// Kunde hat die App installiert (Kanalwahl: Push).
    pub app_installed: bool,
    /// Kunde hat kürzlich einen Warenkorb abgebrochen.
    pub cart_abandoned: bool,
    /// Entfernung zur nächsten Filiale in Kilometern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_store: Option<f64>,
}

impl UserContext {
    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Eine vergangene Aktion des Kunden, z. B. ein Kauf oder ein Seitenaufruf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryAction {
    /// Art der Aktion; nur `"purchase"` fließt in Umsatz und Kaufabstand ein.
    pub r#type: String,
    /// Geldwert der Aktion, bei Nicht-Käufen meist leer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl HistoryAction {
    pub fn purchase(value: f64, at: OffsetDateTime) -> Self {
        Self {
            r#type: PURCHASE.to_string(),
            value: Some(value),
            timestamp: Some(Timestamp::from(at)),
        }
    }

    pub fn is_purchase(&self) -> bool {
        self.r#type == PURCHASE
    }

    /// Umsatzbeitrag dieser Aktion: der Wert bei Käufen, sonst `0`.
    pub fn purchase_value(&self) -> f64 {
        if !self.is_purchase() {
            return 0.0;
        }
        self.value.filter(|v| v.is_finite()).unwrap_or(0.0)
    }
}

/// Zeitstempel einer Aktion: Millisekunden seit Epoch oder RFC-3339-Text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Timestamp {
    EpochMillis(f64),
    Text(String),
}

impl Timestamp {
    /// Liefert `None`, wenn der Zeitstempel nicht interpretierbar ist.
    pub fn resolve(&self) -> Option<OffsetDateTime> {
        match self {
            Self::EpochMillis(ms) => {
                if !ms.is_finite() {
                    return None;
                }
                #[allow(clippy::cast_possible_truncation)]
                let nanos = (ms * 1_000_000.0) as i128;
                OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
            }
            Self::Text(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        }
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(at: OffsetDateTime) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let ms = (at.unix_timestamp_nanos() / 1_000_000) as f64;
        Self::EpochMillis(ms)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<HistoryAction>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<HistoryAction>>::deserialize(deserializer)?.unwrap_or_default())
}
