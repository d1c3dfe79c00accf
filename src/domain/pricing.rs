//! Price table
//!
//! Prices per service type and property size band. The table below is the
//! single source for seeding; `seed_price_table` upserts it by key so it is
//! safe to run on every startup.

use serde::Serialize;

use super::jobs::ServiceType;
use super::money::Money;

/// One size band for one service type. `max_sqm` is inclusive; `None`
/// means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceTier {
    pub service_type: ServiceType,
    pub min_sqm: u32,
    pub max_sqm: Option<u32>,
    pub price: Money,
}

impl PriceTier {
    pub fn covers(&self, service_type: ServiceType, size_sqm: u32) -> bool {
        self.service_type == service_type
            && size_sqm >= self.min_sqm
            && self.max_sqm.map_or(true, |max| size_sqm <= max)
    }
}

const fn tier(service_type: ServiceType, min_sqm: u32, max_sqm: Option<u32>, nok: i64) -> PriceTier {
    PriceTier {
        service_type,
        min_sqm,
        max_sqm,
        price: Money::from_minor(nok * 100),
    }
}

/// Default price table in whole kroner.
pub const DEFAULT_PRICE_TABLE: &[PriceTier] = &[
    tier(ServiceType::BnbCleaning, 0, Some(50), 900),
    tier(ServiceType::BnbCleaning, 51, Some(80), 1_200),
    tier(ServiceType::BnbCleaning, 81, Some(120), 1_600),
    tier(ServiceType::BnbCleaning, 121, None, 2_200),
    tier(ServiceType::DeepCleaning, 0, Some(50), 1_800),
    tier(ServiceType::DeepCleaning, 51, Some(80), 2_500),
    tier(ServiceType::DeepCleaning, 81, Some(120), 3_200),
    tier(ServiceType::DeepCleaning, 121, None, 4_200),
    tier(ServiceType::MoveOutCleaning, 0, Some(50), 2_200),
    tier(ServiceType::MoveOutCleaning, 51, Some(80), 3_000),
    tier(ServiceType::MoveOutCleaning, 81, Some(120), 3_900),
    tier(ServiceType::MoveOutCleaning, 121, None, 5_000),
];

/// Look up the price for a property size. Returns `None` when no band
/// covers it.
pub fn quote(tiers: &[PriceTier], service_type: ServiceType, size_sqm: u32) -> Option<Money> {
    tiers
        .iter()
        .find(|t| t.covers(service_type, size_sqm))
        .map(|t| t.price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_size_is_covered_once() {
        for service in [
            ServiceType::BnbCleaning,
            ServiceType::DeepCleaning,
            ServiceType::MoveOutCleaning,
        ] {
            for size in [0, 1, 50, 51, 80, 81, 120, 121, 400] {
                let matches = DEFAULT_PRICE_TABLE
                    .iter()
                    .filter(|t| t.covers(service, size))
                    .count();
                assert_eq!(matches, 1, "{service} at {size} sqm");
            }
        }
    }

    #[test]
    fn quotes_band_boundaries() {
        let price = quote(DEFAULT_PRICE_TABLE, ServiceType::BnbCleaning, 50).unwrap();
        assert_eq!(price, Money::from_minor(90_000));

        let price = quote(DEFAULT_PRICE_TABLE, ServiceType::BnbCleaning, 51).unwrap();
        assert_eq!(price, Money::from_minor(120_000));

        let price = quote(DEFAULT_PRICE_TABLE, ServiceType::MoveOutCleaning, 300).unwrap();
        assert_eq!(price, Money::from_minor(500_000));
    }

    #[test]
    fn empty_table_has_no_quote() {
        assert_eq!(quote(&[], ServiceType::DeepCleaning, 40), None);
    }
}
