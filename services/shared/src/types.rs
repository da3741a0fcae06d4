/// Type-safe wrappers for domain primitives
///
/// Multipliers and amounts use fixed-point integer arithmetic so that
/// settlement never accumulates floating-point drift. Amounts are plain
/// `u64` smallest settlement units; multipliers are hundredths.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount overflow in winnings computation")]
    Overflow,
}

/// Fixed-point multiplier in hundredths: 100 == 1.00x, 345 == 3.45x
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Multiplier(u64);

impl Multiplier {
    /// 1.00x, the floor of every crash point
    pub const ONE: Multiplier = Multiplier(100);

    pub fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub fn as_hundredths(self) -> u64 {
        self.0
    }

    /// Convert a continuous curve value to fixed point, rounding down
    pub fn from_f64(value: f64) -> Self {
        if value <= 0.0 {
            return Self(0);
        }
        Self((value * 100.0).floor() as u64)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Winnings for a stake at this multiplier, rounded down to the
    /// smallest settlement unit
    pub fn winnings(self, stake: u64) -> Result<u64, AmountError> {
        let raw = (stake as u128)
            .checked_mul(self.0 as u128)
            .ok_or(AmountError::Overflow)?
            / 100;
        u64::try_from(raw).map_err(|_| AmountError::Overflow)
    }

    pub fn min(self, other: Multiplier) -> Multiplier {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_display() {
        assert_eq!(Multiplier::from_hundredths(345).to_string(), "3.45x");
        assert_eq!(Multiplier::ONE.to_string(), "1.00x");
        assert_eq!(Multiplier::from_hundredths(10_000).to_string(), "100.00x");
    }

    #[test]
    fn test_winnings_rounds_down() {
        // 10 units at 2.00x
        assert_eq!(Multiplier::from_hundredths(200).winnings(10).unwrap(), 20);
        // 3 units at 1.33x = 3.99 -> 3
        assert_eq!(Multiplier::from_hundredths(133).winnings(3).unwrap(), 3);
        // 7 units at 1.50x = 10.5 -> 10
        assert_eq!(Multiplier::from_hundredths(150).winnings(7).unwrap(), 10);
    }

    #[test]
    fn test_winnings_u128_intermediate() {
        // u128 intermediate means a max-u64 stake at 1.00x still fits
        assert_eq!(
            Multiplier::from_hundredths(100).winnings(u64::MAX).unwrap(),
            u64::MAX
        );
        // but 100x of max-u64 overflows the u64 result
        assert!(Multiplier::from_hundredths(10_000)
            .winnings(u64::MAX)
            .is_err());
    }

    #[test]
    fn test_from_f64_floors() {
        assert_eq!(Multiplier::from_f64(1.0), Multiplier::ONE);
        assert_eq!(Multiplier::from_f64(2.999), Multiplier::from_hundredths(299));
        assert_eq!(Multiplier::from_f64(-1.0), Multiplier::from_hundredths(0));
    }

    #[test]
    fn test_min() {
        let a = Multiplier::from_hundredths(200);
        let b = Multiplier::from_hundredths(345);
        assert_eq!(a.min(b), a);
        assert_eq!(b.min(a), a);
    }
}
