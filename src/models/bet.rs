use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a bet on an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetSide {
    For,
    Against,
}

impl BetSide {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "for" => Ok(BetSide::For),
            "against" => Ok(BetSide::Against),
            _ => Err(format!("Invalid bet side: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            BetSide::For => "for",
            BetSide::Against => "against",
        }
    }
}

/// Bet lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Active,
    Won,
    Lost,
}

impl BetStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "active" => Ok(BetStatus::Active),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            _ => Err(format!("Invalid bet status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Active => "active",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
        }
    }
}

/// Wager record. `amount`, `option_id`, `side` and `locked_multiplier` are
/// frozen at placement; only `status` changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub option_id: Uuid,
    pub side: BetSide,
    pub amount: i64,
    pub locked_multiplier: Decimal,
    pub status: BetStatus,
    pub placement_key: Option<String>,
    pub placed_at: NaiveDateTime,
}

impl Bet {
    /// Create a new active Bet
    pub fn new(
        user_id: Uuid,
        event_id: Uuid,
        option_id: Uuid,
        side: BetSide,
        amount: i64,
        locked_multiplier: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            option_id,
            side,
            amount,
            locked_multiplier,
            status: BetStatus::Active,
            placement_key: None,
            placed_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Attach the client-supplied idempotency key of the placement batch
    pub fn with_placement_key(mut self, key: Option<String>) -> Self {
        self.placement_key = key;
        self
    }

    /// Payout credited if this bet wins: `round(locked_multiplier * amount)`,
    /// halves rounded away from zero. `None` on overflow.
    pub fn payout(&self) -> Option<Decimal> {
        self.locked_multiplier
            .checked_mul(Decimal::from(self.amount))
            .map(|p| p.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Whether the declared side matches the outcome given the winning options
    pub fn wins_under(&self, winning_option_ids: &[Uuid]) -> bool {
        let option_won = winning_option_ids.contains(&self.option_id);
        match self.side {
            BetSide::For => option_won,
            BetSide::Against => !option_won,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BetStatus::Active
    }

    /// Validate placement-time fields
    pub fn validate(&self) -> Result<(), String> {
        if self.amount <= 0 {
            return Err("Amount must be greater than zero".to_string());
        }
        if self.locked_multiplier <= Decimal::ZERO {
            return Err("Locked multiplier must be positive".to_string());
        }
        Ok(())
    }
}
