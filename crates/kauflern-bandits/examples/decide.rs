use std::io::{self, Read};

use kauflern_bandits::OfferAgent;
use kauflern_core::{default_catalog, Decision, Policy, UserContext};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Serialize)]
struct DecisionRecord {
    ts: String,
    user_id: String,
    policy: String,
    context: UserContext,
    decision: Decision,
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Liest einen `UserContext` als JSON von stdin (leer = Neukunde) und gibt
/// die Entscheidung für den Kunden `demo` aus.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    let ctx: UserContext = if input.trim().is_empty() {
        UserContext::default()
    } else {
        serde_json::from_str(&input)?
    };

    let mut agent = OfferAgent::default();
    let decision = agent.decide("demo", &default_catalog(), &ctx)?;

    let record = DecisionRecord {
        ts: iso8601_now(),
        user_id: "demo".to_string(),
        policy: "kauflern-bandits".to_string(),
        context: ctx,
        decision,
    };

    serde_json::to_writer_pretty(io::stdout(), &record)?;
    println!();

    Ok(())
}
