//! Looks back at offer outcomes and prints a tuning proposal.
//!
//! Run with: cargo run -p kauflern-feedback --example feedback_analysis

use kauflern_core::OfferKind;
use kauflern_feedback::{FeedbackAnalyzer, OfferOutcome};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== kauflern: offer outcome analysis ===\n");

    let mut outcomes = Vec::new();
    // Bundles rarely convert
    for i in 0..7 {
        outcomes.push(outcome(&format!("u{i}"), "o1003", OfferKind::Bundle, i == 0, 0.0));
    }
    // Fixed discounts do a bit better
    for i in 0..6 {
        outcomes.push(outcome(&format!("u{i}"), "o1002", OfferKind::Fixed, i < 2, 1.1));
    }
    outcomes.push(outcome("u9", "o1004", OfferKind::FreeShipping, false, 0.1));

    let analyzer = FeedbackAnalyzer::default();

    println!("Statistics by offer:");
    let by_offer = analyzer.aggregate_outcomes(&outcomes, |o| Some(o.offer_id.clone()));
    let mut offers: Vec<_> = by_offer.iter().collect();
    offers.sort_by(|a, b| a.0.cmp(b.0));
    for (offer_id, stats) in offers {
        println!(
            "  {} -> converted {}/{} ({:.1}%), avg reward {:.2}",
            offer_id,
            stats.conversions,
            stats.total,
            stats.conversion_rate() * 100.0,
            stats.average_reward()
        );
    }
    println!();

    println!("Patterns:");
    let patterns = analyzer.analyze_patterns(&outcomes);
    if patterns.is_empty() {
        println!("  (none)");
    }
    for pattern in &patterns {
        println!("  - {pattern}");
    }
    println!();

    match analyzer.propose_adjustment("offer-agent-v1", &outcomes) {
        Some(proposal) => println!("{}", serde_json::to_string_pretty(&proposal)?),
        None => println!("No adjustment proposed."),
    }
    Ok(())
}

fn outcome(user: &str, offer: &str, kind: OfferKind, converted: bool, reward: f64) -> OfferOutcome {
    OfferOutcome {
        offer_kind: Some(kind),
        ..OfferOutcome::new(user, offer, converted, Some(if converted { reward } else { 0.0 }))
    }
}
