//! Ledger store: the single source of truth for users, events, options and bets.
//!
//! Every mutating engine operation runs inside one [`LedgerTx`]. Rows read
//! through a transaction are locked until it commits or is dropped, and
//! dropping without [`LedgerTx::commit`] discards every write.
//!
//! Lock order is events (ascending id) before users (ascending id).

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use crate::error::LedgerResult;
use crate::models::{Bet, BetOption, Event, MultiplierPair, User};
use async_trait::async_trait;
use uuid::Uuid;

/// Storage backend consumed by the engine
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    /// Read an option outside any transaction
    async fn get_option(&self, option_id: Uuid) -> LedgerResult<Option<BetOption>>;

    /// All options, used to warm the stake board on startup
    async fn list_options(&self) -> LedgerResult<Vec<BetOption>>;

    /// Options whose event is still accepting bets
    async fn active_option_ids(&self) -> LedgerResult<Vec<Uuid>>;

    /// Sum of `amount` over every bet on the option, both sides
    async fn total_wagered_on_option(&self, option_id: Uuid) -> LedgerResult<i64>;

    /// Persist a published pair. Writes with a version not newer than the
    /// stored one are ignored.
    async fn publish_multipliers(
        &self,
        option_id: Uuid,
        pair: MultiplierPair,
        version: i64,
    ) -> LedgerResult<()>;
}

/// One atomic unit of work against the ledger
#[async_trait]
pub trait LedgerTx: Send {
    /// Read and lock a user row
    async fn get_user(&mut self, user_id: Uuid) -> LedgerResult<Option<User>>;

    /// Overwrite balance and winnings. Negative balances are rejected.
    async fn update_user_balance(
        &mut self,
        user_id: Uuid,
        token_balance: i64,
        cumulative_winnings: i64,
    ) -> LedgerResult<User>;

    /// Read an event row under a shared lock. Other shared holders proceed;
    /// an exclusive holder is waited for.
    async fn get_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>>;

    /// Read and exclusively lock an event row, failing with `Contended`
    /// instead of waiting
    async fn claim_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>>;

    /// Write event status, winners and settlement time
    async fn update_event(&mut self, event: &Event) -> LedgerResult<()>;

    async fn get_option(&mut self, option_id: Uuid) -> LedgerResult<Option<BetOption>>;

    async fn get_options_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<BetOption>>;

    /// Read and lock every bet on an event, in placement order
    async fn get_bets_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<Bet>>;

    /// Insert a bet, or update only the status of an existing one
    async fn upsert_bet(&mut self, bet: &Bet) -> LedgerResult<()>;

    /// Bets previously placed by the user under an idempotency key
    async fn find_bets_by_placement_key(
        &mut self,
        user_id: Uuid,
        placement_key: &str,
    ) -> LedgerResult<Vec<Bet>>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
