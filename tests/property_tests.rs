//! Property-based tests for the fare engine and webhook signatures.
//!
//! These use proptest to verify invariants across a wide range of inputs,
//! the most important being that a settled fare always splits into shares
//! that add back up to exactly what the rider paid.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use careride_api::models::{BookingType, VehicleFeature};
use careride_api::payment_processor::WebhookVerifier;
use careride_api::services::fares::{compute_split, FareComponents, FareSchedule, QuoteRequest};

// Strategies for generating test data

/// Cent-denominated amounts up to $1,000.00.
fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn positive_distance_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn components_strategy() -> impl Strategy<Value = FareComponents> {
    (
        money_strategy(),
        money_strategy(),
        money_strategy(),
        money_strategy(),
        money_strategy(),
    )
        .prop_map(|(base, distance, feature, support, peak)| FareComponents {
            base_fare: base,
            distance_fare: distance,
            vehicle_feature_fare: feature,
            support_worker_fare: support,
            peak_surcharge: peak,
        })
}

fn features_strategy() -> impl Strategy<Value = Vec<VehicleFeature>> {
    prop::sample::subsequence(
        vec![
            VehicleFeature::WheelchairAccess,
            VehicleFeature::WalkerStorage,
            VehicleFeature::Stretcher,
            VehicleFeature::OxygenSupport,
            VehicleFeature::AssistanceAnimal,
        ],
        0..=5,
    )
}

fn pickup_time_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    // 2023 through 2030
    (1_672_531_200i64..1_924_992_000)
        .prop_map(|secs| DateTime::from_timestamp(secs, 0).expect("timestamp in range"))
}

fn quote_request(
    distance_km: Decimal,
    vehicle_features: Vec<VehicleFeature>,
    support_workers_count: i32,
    pickup_time: DateTime<Utc>,
) -> QuoteRequest {
    QuoteRequest {
        pickup_address: "1 Test St".to_string(),
        dropoff_address: "2 Test Ave".to_string(),
        distance_km,
        pickup_time,
        vehicle_features,
        support_workers_count,
        booking_type: BookingType::OnDemand,
    }
}

// Same rounding the fare engine applies
fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// Property: the four shares always reassemble the rider's total
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn split_shares_sum_to_the_total_exactly(components in components_strategy()) {
        let split = compute_split(&components).expect("non-negative components split");
        let reassembled = split.driver_share
            + split.support_worker_share
            + split.processor_fee
            + split.platform_fee;
        prop_assert_eq!(
            reassembled, split.total,
            "shares leak money: {:?}", split
        );
        prop_assert_eq!(split.total, components.total());
    }

    #[test]
    fn shares_follow_the_published_rates(components in components_strategy()) {
        let split = compute_split(&components).expect("non-negative components split");
        let rider_fare = components.base_fare
            + components.distance_fare
            + components.vehicle_feature_fare
            + components.peak_surcharge;

        prop_assert_eq!(split.driver_share, round2(dec!(0.70) * rider_fare));
        prop_assert_eq!(
            split.support_worker_share,
            round2(dec!(0.70) * components.support_worker_fare)
        );
        prop_assert_eq!(
            split.processor_fee,
            round2(components.total() * dec!(0.029) + dec!(0.30))
        );
    }

    #[test]
    fn shares_other_than_the_platform_residual_are_never_negative(
        components in components_strategy()
    ) {
        let split = compute_split(&components).expect("non-negative components split");
        prop_assert!(!split.driver_share.is_sign_negative());
        prop_assert!(!split.support_worker_share.is_sign_negative());
        prop_assert!(!split.processor_fee.is_sign_negative());
        // platform_fee is the residual and may go negative on tiny fares;
        // conservation, not positivity, is its invariant
    }
}

// Property: anything the schedule quotes can settle without remainder
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn quoted_fares_always_split_without_remainder(
        distance in positive_distance_strategy(),
        features in features_strategy(),
        workers in 0i32..=10,
        pickup_time in pickup_time_strategy(),
    ) {
        let schedule = FareSchedule::default();
        let fare = schedule
            .quote(&quote_request(distance, features, workers, pickup_time))
            .expect("valid quote request");
        let split = compute_split(&fare).expect("quoted fare splits");

        let reassembled = split.driver_share
            + split.support_worker_share
            + split.processor_fee
            + split.platform_fee;
        prop_assert_eq!(reassembled, fare.total());
    }

    #[test]
    fn duplicate_features_do_not_change_the_quote(
        distance in positive_distance_strategy(),
        features in features_strategy(),
        pickup_time in pickup_time_strategy(),
    ) {
        let schedule = FareSchedule::default();
        let once = schedule
            .quote(&quote_request(distance, features.clone(), 0, pickup_time))
            .expect("valid quote request");

        let mut doubled = features.clone();
        doubled.extend(features);
        let twice = schedule
            .quote(&quote_request(distance, doubled, 0, pickup_time))
            .expect("valid quote request");

        prop_assert_eq!(once.vehicle_feature_fare, twice.vehicle_feature_fare);
        prop_assert_eq!(once.total(), twice.total());
    }

    #[test]
    fn the_local_offset_shifts_the_peak_window(pickup_time in pickup_time_strategy()) {
        // A UTC+10 schedule at t must agree with a UTC schedule at t+10h
        let local = FareSchedule::new(600);
        let utc = FareSchedule::new(0);
        prop_assert_eq!(
            local.is_peak(pickup_time),
            utc.is_peak(pickup_time + Duration::hours(10))
        );
    }
}

// Property: callback signatures verify if and only if nothing was altered
proptest! {
    #[test]
    fn signed_callbacks_verify_within_tolerance(
        body in ".{0,200}",
        skew in -200i64..200,
    ) {
        let verifier = WebhookVerifier::new("whsec_property".to_string(), 300);
        let now = Utc::now();
        let timestamp = (now.timestamp() + skew).to_string();
        let signature = verifier.sign(&timestamp, &body);
        prop_assert!(verifier.verify(&timestamp, &body, &signature, now).is_ok());
    }

    #[test]
    fn tampered_callback_bodies_fail_verification(
        body in "[a-z]{1,100}",
        tail in "[a-z]{1,10}",
    ) {
        let verifier = WebhookVerifier::new("whsec_property".to_string(), 300);
        let now = Utc::now();
        let timestamp = now.timestamp().to_string();
        let signature = verifier.sign(&timestamp, &body);
        let tampered = format!("{}{}", body, tail);
        prop_assert!(verifier.verify(&timestamp, &tampered, &signature, now).is_err());
    }
}
