use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published payout multipliers for both sides of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierPair {
    #[serde(rename = "for")]
    pub for_multiplier: Decimal,
    #[serde(rename = "against")]
    pub against_multiplier: Decimal,
}

impl MultiplierPair {
    pub fn new(for_multiplier: Decimal, against_multiplier: Decimal) -> Self {
        Self {
            for_multiplier,
            against_multiplier,
        }
    }

    /// Same multiplier on both sides
    pub fn neutral(value: Decimal) -> Self {
        Self::new(value, value)
    }

    /// Multiplier a bet on `side` locks in
    pub fn for_side(&self, side: super::BetSide) -> Decimal {
        match side {
            super::BetSide::For => self.for_multiplier,
            super::BetSide::Against => self.against_multiplier,
        }
    }
}

/// A bettable outcome belonging to exactly one event
/// (e.g. "candidate X is hired by company Y")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetOption {
    pub id: Uuid,
    pub event_id: Uuid,
    pub label: String,
    /// Last pair persisted by the stake recomputer
    pub multipliers: MultiplierPair,
    pub multiplier_version: i64,
}

impl BetOption {
    /// Create a new option seeded with the neutral multiplier
    pub fn new(event_id: Uuid, label: impl Into<String>, neutral: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            label: label.into(),
            multipliers: MultiplierPair::neutral(neutral),
            multiplier_version: 0,
        }
    }
}
