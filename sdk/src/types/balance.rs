//! Balance types for the HitBTC SDK.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of one currency in a spot or wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Currency code.
    pub currency: String,

    /// Amount available for trading or withdrawal.
    pub available: Decimal,

    /// Amount reserved by open orders or pending withdrawals.
    pub reserved: Decimal,
}

impl Balance {
    /// Returns the total balance (available + reserved).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.reserved
    }

    /// Returns true if any amount is reserved.
    #[must_use]
    pub fn has_reserved(&self) -> bool {
        !self.reserved.is_zero()
    }

    /// Returns true if both amounts are zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available.is_zero() && self.reserved.is_zero()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} available, {} reserved",
            self.currency, self.available, self.reserved
        )
    }
}
