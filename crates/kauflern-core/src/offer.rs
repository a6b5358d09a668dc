//! Angebotskatalog.
//!
//! Angebote werden von außen geliefert und vom Kern nie verändert. Gelesen
//! werden nur `id` (als Schlüssel der Lernhistorie) und `kind` (für die
//! Heuristik-Regeln).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Die vier Angebotsarten des kanonischen Katalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OfferKind {
    /// Prozentrabatt, z. B. "10% Off First Purchase".
    Percentage,
    /// Fester Betrag, z. B. "$15 Off $75+".
    Fixed,
    /// Bündelangebot, z. B. "Buy 2 Get 1 Free".
    Bundle,
    /// Versandkostenfrei.
    FreeShipping,
}

impl fmt::Display for OfferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
            Self::Bundle => "bundle",
            Self::FreeShipping => "freeShipping",
        };
        f.write_str(s)
    }
}

/// Ein Werbeangebot aus dem Katalog.
///
/// Im JSON heißt das Feld für die Art `type`, im Code `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OfferKind,
    pub value: f64,
    #[serde(default)]
    pub description: String,
}

impl Offer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: OfferKind, value: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            value,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Der kanonische Katalog mit genau einem Angebot pro [`OfferKind`].
pub fn default_catalog() -> Vec<Offer> {
    vec![
        Offer::new("o1001", "10% Off First Purchase", OfferKind::Percentage, 10.0)
            .with_description("10% discount for first-time customers"),
        Offer::new("o1002", "$15 Off $75+", OfferKind::Fixed, 15.0)
            .with_description("$15 discount on orders over $75"),
        Offer::new("o1003", "Buy 2 Get 1 Free", OfferKind::Bundle, 3.0)
            .with_description("Buy 2 items, get 1 free (equal or lesser value)"),
        Offer::new("o1004", "Free Shipping", OfferKind::FreeShipping, 0.0)
            .with_description("Free shipping on all orders"),
    ]
}
