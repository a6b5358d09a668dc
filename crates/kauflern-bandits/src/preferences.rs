//! Profil je Kunde mit den zuletzt gesehenen Features.
//!
//! Der Speicher sammelt nur; die Entscheidung liest ihn nie zurück.

use kauflern_core::CustomerFeatures;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    /// Feature-Name auf zuletzt geschriebenen Wert.
    pub features: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Clone)]
pub struct PreferenceStore {
    records: HashMap<String, PreferenceRecord>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Führt den Feature-Snapshot in den Eintrag des Kunden zusammen und
    /// setzt `last_seen`.
    pub fn record_contact(&mut self, user_id: &str, features: &CustomerFeatures, now: OffsetDateTime) {
        let fields = match serde_json::to_value(features) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            Ok(other) => {
                warn!(user_id, ?other, "feature snapshot did not serialize to an object");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(user_id, error = %e, "feature snapshot could not be serialized");
                BTreeMap::new()
            }
        };
        self.merge(user_id, fields, now);
    }

    /// Flaches Zusammenführen: Schlüssel aus `fields` überschreiben, alle
    /// anderen bleiben. `last_seen` läuft nie rückwärts.
    pub fn merge(&mut self, user_id: &str, fields: BTreeMap<String, Value>, now: OffsetDateTime) {
        let record = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| PreferenceRecord {
                last_seen: now,
                features: BTreeMap::new(),
            });
        record.last_seen = record.last_seen.max(now);
        record.features.extend(fields);
    }

    pub fn get(&self, user_id: &str) -> Option<&PreferenceRecord> {
        self.records.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PreferenceRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn replace(&mut self, records: HashMap<String, PreferenceRecord>) {
        self.records = records;
    }
}
