//! Threadsicherer Zugriff auf einen [`OfferAgent`].
//!
//! Ein einziger Mutex schützt Belohnungstabelle, Explorationsrate,
//! Präferenzen und Score-Log gemeinsam; Entscheidung und Feedback
//! verschränken sich nie. Innerhalb von [`SharedAgent::with`] keine I/O.

use crate::error::Result;
use crate::OfferAgent;
use kauflern_core::{Decision, Offer, Policy, UserContext};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug)]
pub struct SharedAgent<R = StdRng> {
    inner: Arc<Mutex<OfferAgent<R>>>,
}

impl<R> Clone for SharedAgent<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Rng> SharedAgent<R> {
    pub fn new(agent: OfferAgent<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(agent)),
        }
    }

    pub fn decide(&self, user_id: &str, offers: &[Offer], ctx: &UserContext) -> Result<Decision> {
        let now = OffsetDateTime::now_utc();
        self.inner.lock().decide_at(user_id, offers, ctx, now)
    }

    pub fn choose_offer(&self, user_id: &str, offers: &[Offer], ctx: &UserContext) -> Result<Offer> {
        self.decide(user_id, offers, ctx).map(|d| d.offer)
    }

    pub fn update_offer_performance(&self, user_id: &str, offer_id: &str, reward: f64) -> Result<f64> {
        self.inner
            .lock()
            .update_offer_performance(user_id, offer_id, reward)
    }

    pub fn exploration_rate(&self) -> f64 {
        self.inner.lock().exploration_rate()
    }

    pub fn reward_estimate(&self, user_id: &str, offer_id: &str) -> Option<f64> {
        self.inner.lock().reward_estimate(user_id, offer_id)
    }

    pub fn personalization_score(&self, user_id: &str, offer_id: &str) -> Option<f64> {
        self.inner.lock().personalization_score(user_id, offer_id)
    }

    pub fn snapshot(&self) -> Value {
        self.inner.lock().snapshot()
    }

    pub fn load(&self, snapshot: Value) -> Result<()> {
        self.inner.lock().load(snapshot)
    }

    /// Führt `f` unter dem Lock aus.
    pub fn with<T>(&self, f: impl FnOnce(&OfferAgent<R>) -> T) -> T {
        f(&self.inner.lock())
    }
}
