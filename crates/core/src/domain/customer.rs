use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::segment::Segment;

/// Chat-transport sender identity, used verbatim as the document key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub segment: Segment,
    /// 0..=100
    pub confidence: u8,
    /// Deduplicated, first-seen order.
    pub interests: Vec<String>,
    pub last_interaction: DateTime<Utc>,
    pub total_purchases: u32,
    /// 0..=30
    pub discount_level: u8,
}

impl CustomerProfile {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            segment: Segment::New,
            confidence: 0,
            interests: Vec::new(),
            last_interaction: now,
            total_purchases: 0,
            discount_level: 0,
        }
    }

    pub fn summary(&self) -> String {
        let interests = if self.interests.is_empty() {
            "nenhum detectado".to_owned()
        } else {
            self.interests.join(", ")
        };
        format!(
            "segmento={segment}; confiança={confidence}%; interesses={interests}; compras={purchases}; nível de desconto={level}%",
            segment = self.segment,
            confidence = self.confidence,
            purchases = self.total_purchases,
            level = self.discount_level,
        )
    }
}
