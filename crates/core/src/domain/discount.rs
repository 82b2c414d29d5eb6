use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived, never persisted as authoritative state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub discount_pct: u8,
    pub reasons: Vec<String>,
    pub code: String,
    pub valid_until: DateTime<Utc>,
    pub conditions: Vec<String>,
}

impl DiscountQuote {
    pub fn reason(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub original_price: Decimal,
    pub discount_amount: Decimal,
    pub final_price: Decimal,
    pub discount_pct: u8,
}
