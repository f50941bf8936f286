//! Domain models for the wager engine.
//!
//! Users, events, options and bets as the ledger store persists them.

pub mod bet;
pub mod bet_option;
pub mod event;
pub mod user;

// Re-export all models for convenient access
pub use bet::{Bet, BetSide, BetStatus};
pub use bet_option::{BetOption, MultiplierPair};
pub use event::{Event, EventStatus};
pub use user::{User, STARTING_BALANCE};
