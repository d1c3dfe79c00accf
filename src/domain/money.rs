//! Fixed-point money in minor currency units.
//!
//! Amounts are held as an integer count of minor units (øre, cents). The
//! HTTP boundary speaks plain decimal numbers in major units; conversion
//! happens here and nowhere else.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decimal places between major and minor units.
pub const MINOR_UNIT_SCALE: u32 = 2;

const BPS_DENOMINATOR: i128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount must not be negative")]
    Negative,

    #[error("amount has more than {MINOR_UNIT_SCALE} decimal places")]
    SubMinorPrecision,

    #[error("amount is out of range")]
    Overflow,

    #[error("invalid amount: {0}")]
    Invalid(String),
}

/// Non-negative amount in minor units of the platform currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Convert a major-unit decimal (e.g. `1000.50`) into minor units.
    /// Rejects negative values and anything finer than one minor unit.
    pub fn from_major(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let rounded = amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::ToZero);
        if rounded != amount {
            return Err(MoneyError::SubMinorPrecision);
        }
        let minor = (rounded * Decimal::ONE_HUNDRED)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Self(minor))
    }

    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0
            .checked_sub(other.0)
            .filter(|minor| *minor >= 0)
            .map(Money)
    }

    /// Share of this amount expressed in basis points, rounded half-up to
    /// the nearest minor unit.
    pub fn share_bps(self, bps: u32) -> Money {
        let scaled = self.0 as i128 * bps as i128;
        let share = (scaled + BPS_DENOMINATOR / 2) / BPS_DENOMINATOR;
        Money(share as i64)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount =
            Decimal::from_str(s.trim()).map_err(|e| MoneyError::Invalid(e.to_string()))?;
        Money::from_major(amount)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Display only; values never re-enter arithmetic through f64.
        serializer.serialize_f64(self.to_major().to_f64().unwrap_or_default())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Float(f64),
            Text(String),
        }

        let amount = match Raw::deserialize(deserializer)? {
            Raw::Integer(n) => Decimal::from(n),
            // Shortest round-trip text, so `1000.005` stays `1000.005`
            Raw::Float(f) if f.is_finite() => {
                Decimal::from_str(&f.to_string()).map_err(serde::de::Error::custom)?
            }
            Raw::Float(_) => {
                return Err(serde::de::Error::custom("amount is not a finite number"))
            }
            Raw::Text(s) => Decimal::from_str(s.trim()).map_err(serde::de::Error::custom)?,
        };

        Money::from_major(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn converts_major_to_minor_exactly() {
        let amount = Decimal::from_str("1000.10").unwrap();
        assert_eq!(Money::from_major(amount).unwrap().minor(), 100_010);

        let amount = Decimal::from_str("0.29").unwrap();
        assert_eq!(Money::from_major(amount).unwrap().minor(), 29);
    }

    #[test]
    fn rejects_sub_minor_precision() {
        let amount = Decimal::from_str("10.005").unwrap();
        assert_eq!(
            Money::from_major(amount).unwrap_err(),
            MoneyError::SubMinorPrecision
        );
    }

    #[test]
    fn rejects_negative_amounts() {
        let amount = Decimal::from_str("-1").unwrap();
        assert_eq!(Money::from_major(amount).unwrap_err(), MoneyError::Negative);
    }

    #[test]
    fn share_rounds_half_up() {
        // 10% of 0.05 is 0.005 -> rounds to 0.01
        assert_eq!(Money::from_minor(5).share_bps(1000).minor(), 1);
        assert_eq!(Money::from_minor(4).share_bps(1000).minor(), 0);
        assert_eq!(Money::from_minor(100_000).share_bps(1000).minor(), 10_000);
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let m: Money = serde_json::from_str("1000").unwrap();
        assert_eq!(m.minor(), 100_000);

        let m: Money = serde_json::from_str("19.99").unwrap();
        assert_eq!(m.minor(), 1_999);

        let m: Money = serde_json::from_str("\"0.10\"").unwrap();
        assert_eq!(m.minor(), 10);

        assert!(serde_json::from_str::<Money>("-5").is_err());
    }

    #[test]
    fn numbers_and_strings_reject_sub_minor_precision_alike() {
        let number = serde_json::from_str::<Money>("1000.005").unwrap_err();
        let text = serde_json::from_str::<Money>("\"1000.005\"").unwrap_err();
        assert!(number.to_string().contains("decimal places"));
        assert!(text.to_string().contains("decimal places"));

        let m: Money = serde_json::from_str("1000.5").unwrap();
        assert_eq!(m.minor(), 100_050);
    }

    #[test]
    fn serializes_as_major_units() {
        let json = serde_json::to_string(&Money::from_minor(123_456)).unwrap();
        assert_eq!(json, "1234.56");
    }

    proptest! {
        #[test]
        fn share_never_exceeds_whole(minor in 0i64..1_000_000_000_000, bps in 0u32..=10_000) {
            let total = Money::from_minor(minor);
            let share = total.share_bps(bps);
            prop_assert!(share <= total);
            prop_assert_eq!(total.checked_sub(share).unwrap().checked_add(share), Some(total));
        }

        #[test]
        fn major_minor_round_trip(minor in 0i64..1_000_000_000_000) {
            let money = Money::from_minor(minor);
            prop_assert_eq!(Money::from_major(money.to_major()).unwrap(), money);
        }
    }
}
