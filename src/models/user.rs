use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tokens granted to every account at signup
pub const STARTING_BALANCE: i64 = 100_000;

/// User account as seen by the wager engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Never persisted below zero
    pub token_balance: i64,
    /// Informational running total of payouts, reduced again on revert
    pub cumulative_winnings: i64,
    pub created_at: NaiveDateTime,
}

impl User {
    /// Create a new User with the given opening balance
    pub fn new(token_balance: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_balance,
            cumulative_winnings: 0,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Create a new User with the signup grant
    pub fn with_signup_grant() -> Self {
        Self::new(STARTING_BALANCE)
    }
}
