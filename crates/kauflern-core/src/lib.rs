//! Kerntypen und das [`Policy`]-Trait für die Angebotsauswahl.
//!
//! `kauflern-core` kennt nur Daten: den Angebotskatalog, den Kundenkontext einer
//! Anfrage und den daraus abgeleiteten Feature-Snapshot. Die eigentliche
//! Lernlogik lebt in `kauflern-bandits`.

pub mod context;
pub mod features;
pub mod offer;

pub use context::{HistoryAction, Timestamp, UserContext};
pub use features::{CustomerFeatures, FeatureExtractor, HIGH_VALUE_THRESHOLD, NO_PURCHASE_SENTINEL};
pub use offer::{default_catalog, Offer, OfferKind};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ob eine Entscheidung zufällig (ε) oder über den Scorer getroffen wurde.
#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode { Explore, Exploit }

/// Zustellkanal für das gewählte Angebot.
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,Serialize,Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel { Email, Sms, Push }

#[derive(Debug,Serialize,Deserialize,Clone)]
pub struct Decision {
    pub offer: Offer,
    pub mode: DecisionMode,
    /// Nur bei `Exploit` gesetzt: der Score des gewählten Angebots in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub channel: Channel,
    pub factors: Vec<String>,
    pub features: CustomerFeatures,
}

/// Eine lernende Angebots-Policy.
///
/// `decide` und `feedback` entsprechen den beiden Operationen, die ein
/// Service-Layer pro Anfrage aufruft; `snapshot`/`load` erlauben es, den
/// gelernten Zustand zwischen Prozessläufen zu sichern.
pub trait Policy {
    type Error;

    fn decide(&mut self, user_id: &str, offers: &[Offer], ctx: &UserContext) -> Result<Decision, Self::Error>;
    fn feedback(&mut self, user_id: &str, offer_id: &str, reward: f64) -> Result<(), Self::Error>;
    fn snapshot(&self) -> Value;
    fn load(&mut self, snapshot: Value) -> Result<(), Self::Error>;
}
