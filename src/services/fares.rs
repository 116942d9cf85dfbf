use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{BookingType, VehicleFeature};

/// Share of the rider-facing fare (minus the support-worker component)
/// paid to the driver.
const DRIVER_SHARE_RATE: Decimal = dec!(0.70);
/// Share of the support-worker component paid to the support worker.
const SUPPORT_WORKER_SHARE_RATE: Decimal = dec!(0.70);
/// Processor fee model: percentage of the total plus a fixed charge.
const PROCESSOR_FEE_RATE: Decimal = dec!(0.029);
const PROCESSOR_FEE_FIXED: Decimal = dec!(0.30);

/// Round to the currency minor unit, half away from zero.
fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The five fare inputs captured on a booking. Settlement recomputes the
/// split from these, so they are persisted per booking rather than derived
/// from whatever the schedule says at settlement time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FareComponents {
    pub base_fare: Decimal,
    pub distance_fare: Decimal,
    pub vehicle_feature_fare: Decimal,
    pub support_worker_fare: Decimal,
    pub peak_surcharge: Decimal,
}

impl FareComponents {
    pub fn total(&self) -> Decimal {
        self.base_fare
            + self.distance_fare
            + self.vehicle_feature_fare
            + self.support_worker_fare
            + self.peak_surcharge
    }

    /// A booking must never reach payment with a negative fare component.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let labelled = [
            ("base_fare", self.base_fare),
            ("distance_fare", self.distance_fare),
            ("vehicle_feature_fare", self.vehicle_feature_fare),
            ("support_worker_fare", self.support_worker_fare),
            ("peak_surcharge", self.peak_surcharge),
        ];
        for (name, value) in labelled {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ServiceError::ValidationError(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Per-recipient shares of a settled fare. `platform_fee` is the residual
/// after the other three shares, so the four always sum to `total` exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FareSplit {
    pub total: Decimal,
    pub driver_share: Decimal,
    pub support_worker_share: Decimal,
    pub processor_fee: Decimal,
    pub platform_fee: Decimal,
}

/// Split a fare between driver, support worker, processor, and platform.
///
/// Rounding is applied once per share; the platform share absorbs whatever
/// the rounded shares leave over, which keeps the sum of the four equal to
/// the total without a remainder ledger.
pub fn compute_split(components: &FareComponents) -> Result<FareSplit, ServiceError> {
    components.validate()?;

    let total = components.total();
    let driver_pool = components.base_fare
        + components.distance_fare
        + components.vehicle_feature_fare
        + components.peak_surcharge;

    let driver_share = round2(DRIVER_SHARE_RATE * driver_pool);
    let support_worker_share = round2(SUPPORT_WORKER_SHARE_RATE * components.support_worker_fare);
    let processor_fee = round2(total * PROCESSOR_FEE_RATE + PROCESSOR_FEE_FIXED);
    let platform_fee = round2(total - driver_share - support_worker_share - processor_fee);

    Ok(FareSplit {
        total,
        driver_share,
        support_worker_share,
        processor_fee,
        platform_fee,
    })
}

/// Quote input. Distance is measured by the caller; this core prices, it
/// does not route.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QuoteRequest {
    #[validate(length(min = 1, max = 512))]
    pub pickup_address: String,
    #[validate(length(min = 1, max = 512))]
    pub dropoff_address: String,
    pub distance_km: Decimal,
    pub pickup_time: DateTime<Utc>,
    #[serde(default)]
    pub vehicle_features: Vec<VehicleFeature>,
    #[serde(default)]
    #[validate(range(min = 0, max = 10))]
    pub support_workers_count: i32,
    pub booking_type: BookingType,
}

/// Pricing constants for turning a quote request into fare components.
#[derive(Clone, Copy, Debug)]
pub struct FareSchedule {
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub support_worker_rate: Decimal,
    /// Surcharge rate applied to base + distance during peak windows.
    pub peak_rate: Decimal,
    /// Offset from UTC, in minutes, of the service area's wall clock.
    /// Peak windows are defined against local time.
    pub local_offset_minutes: i32,
}

impl FareSchedule {
    pub fn new(local_offset_minutes: i32) -> Self {
        Self {
            base_fare: dec!(8.50),
            per_km_rate: dec!(2.20),
            support_worker_rate: dec!(20.50),
            peak_rate: dec!(0.15),
            local_offset_minutes,
        }
    }

    pub fn feature_fee(&self, feature: VehicleFeature) -> Decimal {
        match feature {
            VehicleFeature::WheelchairAccess => dec!(6.00),
            VehicleFeature::WalkerStorage => dec!(2.50),
            VehicleFeature::Stretcher => dec!(15.00),
            VehicleFeature::OxygenSupport => dec!(9.00),
            // Assistance animals ride free
            VehicleFeature::AssistanceAnimal => Decimal::ZERO,
        }
    }

    /// Weekday 07:00-09:00 and 16:00-19:00 local time.
    pub fn is_peak(&self, pickup_time: DateTime<Utc>) -> bool {
        let local = pickup_time + Duration::minutes(i64::from(self.local_offset_minutes));
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let hour = local.hour();
        (7..9).contains(&hour) || (16..19).contains(&hour)
    }

    /// Price a quote request into the fare components a booking would carry.
    pub fn quote(&self, request: &QuoteRequest) -> Result<FareComponents, ServiceError> {
        request.validate()?;
        if request.distance_km <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "distance_km must be positive, got {}",
                request.distance_km
            )));
        }

        let distance_fare = round2(request.distance_km * self.per_km_rate);

        // A feature requested twice is charged once
        let features: HashSet<VehicleFeature> =
            request.vehicle_features.iter().copied().collect();
        let vehicle_feature_fare = features
            .into_iter()
            .fold(Decimal::ZERO, |acc, f| acc + self.feature_fee(f));

        let support_worker_fare =
            round2(self.support_worker_rate * Decimal::from(request.support_workers_count));

        let peak_surcharge = if self.is_peak(request.pickup_time) {
            round2((self.base_fare + distance_fare) * self.peak_rate)
        } else {
            Decimal::ZERO
        };

        let components = FareComponents {
            base_fare: self.base_fare,
            distance_fare,
            vehicle_feature_fare,
            support_worker_fare,
            peak_surcharge,
        };
        components.validate()?;
        Ok(components)
    }
}

impl Default for FareSchedule {
    fn default() -> Self {
        // Australian eastern standard time
        Self::new(600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn components(
        base: Decimal,
        distance: Decimal,
        feature: Decimal,
        support: Decimal,
        peak: Decimal,
    ) -> FareComponents {
        FareComponents {
            base_fare: base,
            distance_fare: distance,
            vehicle_feature_fare: feature,
            support_worker_fare: support,
            peak_surcharge: peak,
        }
    }

    #[test]
    fn split_matches_published_example() {
        let split = compute_split(&components(
            dec!(8.50),
            dec!(11.00),
            dec!(6.00),
            dec!(20.50),
            dec!(0),
        ))
        .unwrap();

        assert_eq!(split.total, dec!(46.00));
        assert_eq!(split.driver_share, dec!(17.85));
        assert_eq!(split.support_worker_share, dec!(14.35));
        assert_eq!(split.processor_fee, dec!(1.63));
        assert_eq!(split.platform_fee, dec!(12.17));
    }

    #[test]
    fn split_conserves_the_total() {
        let inputs = [
            components(dec!(8.50), dec!(4.07), dec!(6.00), dec!(0), dec!(1.89)),
            components(dec!(8.50), dec!(219.78), dec!(32.50), dec!(61.50), dec!(0)),
            components(dec!(0.01), dec!(0), dec!(0), dec!(0.01), dec!(0)),
        ];
        for input in inputs {
            let split = compute_split(&input).unwrap();
            assert_eq!(
                split.driver_share
                    + split.support_worker_share
                    + split.processor_fee
                    + split.platform_fee,
                split.total,
                "shares must sum to total for {:?}",
                input
            );
        }
    }

    #[test]
    fn processor_fee_rounds_half_away_from_zero() {
        // 25.00 * 0.029 + 0.30 = 1.025, which must round to 1.03 not 1.02
        let split = compute_split(&components(
            dec!(25.00),
            dec!(0),
            dec!(0),
            dec!(0),
            dec!(0),
        ))
        .unwrap();
        assert_eq!(split.processor_fee, dec!(1.03));
    }

    #[test]
    fn negative_component_is_rejected() {
        let err = compute_split(&components(
            dec!(8.50),
            dec!(-1.00),
            dec!(0),
            dec!(0),
            dec!(0),
        ))
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn support_share_is_zero_without_support_workers() {
        let split = compute_split(&components(
            dec!(8.50),
            dec!(11.00),
            dec!(0),
            dec!(0),
            dec!(0),
        ))
        .unwrap();
        assert_eq!(split.support_worker_share, dec!(0.00));
    }

    fn quote_request(pickup_time: DateTime<Utc>) -> QuoteRequest {
        QuoteRequest {
            pickup_address: "12 Harbour St, Sydney".into(),
            dropoff_address: "4 Clinic Ln, Sydney".into(),
            distance_km: dec!(5.00),
            pickup_time,
            vehicle_features: vec![VehicleFeature::WheelchairAccess],
            support_workers_count: 1,
            booking_type: BookingType::OnDemand,
        }
    }

    fn aest(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        // Schedule under test uses UTC+10; build instants from local wall time
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap() - Duration::minutes(600)
    }

    #[test]
    fn quote_prices_the_published_example() {
        let schedule = FareSchedule::default();
        // Tuesday 11:00 local, off peak
        let fare = schedule.quote(&quote_request(aest(2024, 7, 2, 11, 0))).unwrap();

        assert_eq!(fare.base_fare, dec!(8.50));
        assert_eq!(fare.distance_fare, dec!(11.00));
        assert_eq!(fare.vehicle_feature_fare, dec!(6.00));
        assert_eq!(fare.support_worker_fare, dec!(20.50));
        assert_eq!(fare.peak_surcharge, dec!(0));
        assert_eq!(fare.total(), dec!(46.00));
    }

    #[test]
    fn peak_windows_are_weekday_local_time() {
        let schedule = FareSchedule::default();

        // Tuesdays
        assert!(!schedule.is_peak(aest(2024, 7, 2, 6, 59)));
        assert!(schedule.is_peak(aest(2024, 7, 2, 7, 0)));
        assert!(schedule.is_peak(aest(2024, 7, 2, 8, 59)));
        assert!(!schedule.is_peak(aest(2024, 7, 2, 9, 0)));
        assert!(schedule.is_peak(aest(2024, 7, 2, 16, 0)));
        assert!(schedule.is_peak(aest(2024, 7, 2, 18, 59)));
        assert!(!schedule.is_peak(aest(2024, 7, 2, 19, 0)));

        // Saturday morning, same hours
        assert!(!schedule.is_peak(aest(2024, 7, 6, 8, 0)));
    }

    #[test]
    fn peak_surcharge_applies_to_base_and_distance_only() {
        let schedule = FareSchedule::default();
        // Tuesday 08:00 local
        let fare = schedule.quote(&quote_request(aest(2024, 7, 2, 8, 0))).unwrap();

        // 15% of (8.50 + 11.00)
        assert_eq!(fare.peak_surcharge, dec!(2.93));
        assert_eq!(fare.total(), dec!(48.93));
    }

    #[test]
    fn duplicate_features_charge_once() {
        let schedule = FareSchedule::default();
        let mut request = quote_request(aest(2024, 7, 2, 11, 0));
        request.vehicle_features = vec![
            VehicleFeature::WheelchairAccess,
            VehicleFeature::WheelchairAccess,
        ];
        let fare = schedule.quote(&request).unwrap();
        assert_eq!(fare.vehicle_feature_fare, dec!(6.00));
    }

    #[test]
    fn assistance_animals_ride_free() {
        let schedule = FareSchedule::default();
        assert_eq!(
            schedule.feature_fee(VehicleFeature::AssistanceAnimal),
            Decimal::ZERO
        );
    }

    #[test]
    fn zero_distance_is_rejected() {
        let schedule = FareSchedule::default();
        let mut request = quote_request(aest(2024, 7, 2, 11, 0));
        request.distance_km = dec!(0);
        let err = schedule.quote(&request).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
