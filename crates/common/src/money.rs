use serde::{Deserialize, Serialize};

/// Money amount represented in integer cents to avoid floating point issues.
///
/// Serializes as a bare integer, e.g. `9998` for $99.98.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new amount from a whole-dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn as_cents(&self) -> i64 {
        self.0
    }

    /// Adds two amounts, saturating at the bounds of `i64`.
    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Multiplies the amount by a quantity, saturating at the bounds of `i64`.
    pub fn times(self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), Money::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cents_and_dollars() {
        assert_eq!(Money::from_cents(9998).as_cents(), 9998);
        assert_eq!(Money::from_dollars(10), Money::from_cents(1000));
    }

    #[test]
    fn times_and_sum() {
        let unit = Money::from_cents(4999);
        assert_eq!(unit.times(2), Money::from_cents(9998));

        let total: Money = [unit.times(2), Money::from_cents(2)].into_iter().sum();
        assert_eq!(total, Money::from_cents(10000));
    }

    #[test]
    fn display_formats_cents() {
        assert_eq!(Money::from_cents(9998).to_string(), "99.98");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&Money::from_cents(9998)).unwrap();
        assert_eq!(json, "9998");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_cents(9998));
    }
}
