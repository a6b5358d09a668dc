//! Kanalwahl und lesbare Begründungen für eine Entscheidung.

use kauflern_core::{Channel, CustomerFeatures, Offer, OfferKind, UserContext};

const MAX_FACTORS: usize = 3;
const EVENING_FROM_HOUR: u8 = 18;
const MANY_VIEWED_PRODUCTS: f64 = 3.0;
const CART_NEAR_THRESHOLD: f64 = 60.0;
const FAR_FROM_STORE_KM: f64 = 20.0;

/// SMS für mobile Kunden, Push für App-Nutzer, sonst E-Mail.
pub fn select_channel(ctx: &UserContext) -> Channel {
    if ctx.mobile {
        Channel::Sms
    } else if ctx.app_installed {
        Channel::Push
    } else {
        Channel::Email
    }
}

/// Höchstens drei Gründe: erst kundenbezogene, dann angebotsbezogene.
pub fn personalization_factors(
    ctx: &UserContext,
    features: &CustomerFeatures,
    offer: &Offer,
) -> Vec<String> {
    let mut factors = Vec::new();

    factors.push(if features.is_returning_customer {
        "Returning customer"
    } else {
        "First-time customer"
    });
    if ctx.cart_abandoned {
        factors.push("Recently abandoned cart");
    }
    if features.viewed_products > MANY_VIEWED_PRODUCTS {
        factors.push("Multiple product views");
    }
    if features.time_of_day >= EVENING_FROM_HOUR {
        factors.push("Evening shopper");
    }
    if matches!(features.day_of_week, 0 | 6) {
        factors.push("Weekend shopper");
    }

    match offer.kind {
        OfferKind::Percentage if !features.is_returning_customer => {
            factors.push("First purchase discount");
        }
        OfferKind::Fixed if features.cart_value > CART_NEAR_THRESHOLD => {
            factors.push("Cart value near threshold");
        }
        OfferKind::FreeShipping
            if ctx
                .distance_to_store
                .is_some_and(|km| km > FAR_FROM_STORE_KM) =>
        {
            factors.push("Located far from physical store");
        }
        _ => {}
    }

    factors
        .into_iter()
        .take(MAX_FACTORS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kauflern_core::{default_catalog, NO_PURCHASE_SENTINEL};

    fn weekday_morning() -> CustomerFeatures {
        CustomerFeatures {
            is_returning_customer: false,
            is_high_value: false,
            time_of_day: 9,
            day_of_week: 3,
            device_type: "desktop".into(),
            location: "unknown".into(),
            last_purchase_days: Some(NO_PURCHASE_SENTINEL),
            cart_value: 0.0,
            viewed_products: 0.0,
        }
    }

    fn offer(kind: OfferKind) -> Offer {
        default_catalog()
            .into_iter()
            .find(|o| o.kind == kind)
            .expect("Katalog enthält jede Angebotsart")
    }

    #[test]
    fn channel_prefers_sms_then_push_then_email() {
        let mut ctx = UserContext::default();
        assert_eq!(select_channel(&ctx), Channel::Email);
        ctx.app_installed = true;
        assert_eq!(select_channel(&ctx), Channel::Push);
        ctx.mobile = true;
        assert_eq!(select_channel(&ctx), Channel::Sms);
    }

    #[test]
    fn first_time_customer_gets_first_purchase_reason() {
        let factors = personalization_factors(
            &UserContext::default(),
            &weekday_morning(),
            &offer(OfferKind::Percentage),
        );
        assert_eq!(factors, vec!["First-time customer", "First purchase discount"]);
    }

    #[test]
    fn factors_are_truncated_to_three() {
        let features = CustomerFeatures {
            is_returning_customer: true,
            time_of_day: 21,
            day_of_week: 0,
            viewed_products: 7.0,
            cart_value: 90.0,
            ..weekday_morning()
        };
        let factors =
            personalization_factors(&UserContext::default(), &features, &offer(OfferKind::Fixed));
        assert_eq!(
            factors,
            vec!["Returning customer", "Multiple product views", "Evening shopper"]
        );
    }

    #[test]
    fn abandoned_cart_ranks_second_and_displaces_later_factors() {
        let features = CustomerFeatures {
            is_returning_customer: true,
            viewed_products: 5.0,
            time_of_day: 20,
            ..weekday_morning()
        };
        let ctx = UserContext {
            cart_abandoned: true,
            ..UserContext::default()
        };
        let factors = personalization_factors(&ctx, &features, &offer(OfferKind::Bundle));
        assert_eq!(
            factors,
            vec!["Returning customer", "Recently abandoned cart", "Multiple product views"]
        );
    }

    #[test]
    fn free_shipping_far_from_store() {
        let far = UserContext {
            distance_to_store: Some(35.0),
            ..UserContext::default()
        };
        let near = UserContext {
            distance_to_store: Some(20.0),
            ..UserContext::default()
        };
        let shipping = offer(OfferKind::FreeShipping);

        assert_eq!(
            personalization_factors(&far, &weekday_morning(), &shipping),
            vec!["First-time customer", "Located far from physical store"]
        );
        assert_eq!(
            personalization_factors(&near, &weekday_morning(), &shipping),
            vec!["First-time customer"]
        );
        // nur für Gratisversand
        assert_eq!(
            personalization_factors(&far, &weekday_morning(), &offer(OfferKind::Bundle)),
            vec!["First-time customer"]
        );
    }
}
