use kauflern_bandits::{AgentConfig, OfferAgent};
use kauflern_core::{default_catalog, UserContext};
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut agent = OfferAgent::seeded(AgentConfig::default(), 1)?;
    let catalog = default_catalog();
    let ctx = UserContext::default();

    let iterations: u32 = 1_000_000;

    let start = Instant::now();
    for _ in 0..iterations {
        agent.update_offer_performance("u1", "o1001", 1.0)?;
    }
    let duration = start.elapsed();
    println!("Feedback for EXISTING pair took: {:?}", duration);
    println!("Average per call: {:?}", duration / iterations);

    // Wachsende Belohnungstabelle: ein neuer Kunde pro Aufruf.
    let users: u32 = 100_000;
    let start = Instant::now();
    for i in 0..users {
        agent.update_offer_performance(&format!("user-{i}"), "o1002", 0.5)?;
    }
    let duration = start.elapsed();
    println!("Feedback for NEW users (0..{}) took: {:?}", users, duration);
    println!("Average per call: {:?}", duration / users);

    let decisions: u32 = 100_000;
    let start = Instant::now();
    for i in 0..decisions {
        agent.choose_offer(&format!("user-{}", i % users), &catalog, &ctx)?;
    }
    let duration = start.elapsed();
    println!("Decisions took: {:?}", duration);
    println!("Average per call: {:?}", duration / decisions);

    Ok(())
}
