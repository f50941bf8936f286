#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;
use wager_engine::error::LedgerResult;
use wager_engine::ledger::{LedgerStore, LedgerTx, MemoryLedger, PgLedger};
use wager_engine::models::*;
use wager_engine::{StakeCalculator, WagerEngine, WagerItem};

/// Parse a decimal literal
pub fn dec(s: &str) -> Decimal {
    s.parse().expect("Invalid decimal literal")
}

/// Engine over an in-memory ledger, with direct access to the store
pub struct TestEngine {
    pub ledger: MemoryLedger,
    pub engine: Arc<WagerEngine>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_calculator(StakeCalculator::default())
    }

    pub fn with_calculator(calculator: StakeCalculator) -> Self {
        let ledger = MemoryLedger::new();
        let engine = Arc::new(WagerEngine::new(Arc::new(ledger.clone()), calculator));
        Self { ledger, engine }
    }

    /// Engine whose next `claim_event` parks until the gate is released
    pub fn gated() -> (Self, Arc<ClaimGate>) {
        let ledger = MemoryLedger::new();
        let gate = Arc::new(ClaimGate::default());
        let store = GatedLedger {
            inner: ledger.clone(),
            gate: gate.clone(),
        };
        let engine = Arc::new(WagerEngine::new(Arc::new(store), StakeCalculator::default()));
        (Self { ledger, engine }, gate)
    }

    pub async fn create_user(&self, balance: i64) -> User {
        self.ledger.insert_user(User::new(balance)).await
    }

    pub async fn create_event(&self) -> Event {
        self.ledger.insert_event(Event::new()).await
    }

    /// Option with the neutral 2.00 pair
    pub async fn create_option(&self, event_id: Uuid, label: &str) -> BetOption {
        self.ledger
            .insert_option(BetOption::new(event_id, label, dec("2.00")))
            .await
    }

    /// Option whose persisted pair is `for_multiplier` / `against_multiplier`
    pub async fn create_priced_option(
        &self,
        event_id: Uuid,
        for_multiplier: &str,
        against_multiplier: &str,
    ) -> BetOption {
        let mut option = BetOption::new(event_id, "priced", dec("2.00"));
        option.multipliers = MultiplierPair::new(dec(for_multiplier), dec(against_multiplier));
        option.multiplier_version = 1;
        self.ledger.insert_option(option).await
    }

    pub async fn balance(&self, user_id: Uuid) -> i64 {
        self.ledger
            .user(user_id)
            .await
            .expect("User should exist")
            .token_balance
    }

    pub async fn winnings(&self, user_id: Uuid) -> i64 {
        self.ledger
            .user(user_id)
            .await
            .expect("User should exist")
            .cumulative_winnings
    }

    pub async fn bets_for(&self, user_id: Uuid) -> Vec<Bet> {
        self.ledger.bets_for_user(user_id).await
    }
}

/// Holds one settlement inside its transaction so another call can run
/// against it
#[derive(Default)]
pub struct ClaimGate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ClaimGate {
    /// Park the next `claim_event` call
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until the armed claim has been reached
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

struct GatedLedger {
    inner: MemoryLedger,
    gate: Arc<ClaimGate>,
}

#[async_trait]
impl LedgerStore for GatedLedger {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(GatedTx {
            inner,
            gate: self.gate.clone(),
        }))
    }

    async fn get_option(&self, option_id: Uuid) -> LedgerResult<Option<BetOption>> {
        self.inner.get_option(option_id).await
    }

    async fn list_options(&self) -> LedgerResult<Vec<BetOption>> {
        self.inner.list_options().await
    }

    async fn active_option_ids(&self) -> LedgerResult<Vec<Uuid>> {
        self.inner.active_option_ids().await
    }

    async fn total_wagered_on_option(&self, option_id: Uuid) -> LedgerResult<i64> {
        self.inner.total_wagered_on_option(option_id).await
    }

    async fn publish_multipliers(
        &self,
        option_id: Uuid,
        pair: MultiplierPair,
        version: i64,
    ) -> LedgerResult<()> {
        self.inner.publish_multipliers(option_id, pair, version).await
    }
}

struct GatedTx {
    inner: Box<dyn LedgerTx>,
    gate: Arc<ClaimGate>,
}

#[async_trait]
impl LedgerTx for GatedTx {
    async fn get_user(&mut self, user_id: Uuid) -> LedgerResult<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn update_user_balance(
        &mut self,
        user_id: Uuid,
        token_balance: i64,
        cumulative_winnings: i64,
    ) -> LedgerResult<User> {
        self.inner
            .update_user_balance(user_id, token_balance, cumulative_winnings)
            .await
    }

    async fn get_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>> {
        self.inner.get_event(event_id).await
    }

    async fn claim_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>> {
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }
        self.inner.claim_event(event_id).await
    }

    async fn update_event(&mut self, event: &Event) -> LedgerResult<()> {
        self.inner.update_event(event).await
    }

    async fn get_option(&mut self, option_id: Uuid) -> LedgerResult<Option<BetOption>> {
        self.inner.get_option(option_id).await
    }

    async fn get_options_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<BetOption>> {
        self.inner.get_options_for_event(event_id).await
    }

    async fn get_bets_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<Bet>> {
        self.inner.get_bets_for_event(event_id).await
    }

    async fn upsert_bet(&mut self, bet: &Bet) -> LedgerResult<()> {
        self.inner.upsert_bet(bet).await
    }

    async fn find_bets_by_placement_key(
        &mut self,
        user_id: Uuid,
        placement_key: &str,
    ) -> LedgerResult<Vec<Bet>> {
        self.inner.find_bets_by_placement_key(user_id, placement_key).await
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.inner.commit().await
    }
}

/// Shorthand for one placement item
pub fn wager(event: &Event, option: &BetOption, side: BetSide, amount: i64) -> WagerItem {
    WagerItem {
        event_id: event.id,
        option_id: option.id,
        side,
        amount,
    }
}

/// Assert that two bets are equal (ignoring timestamps)
pub fn assert_bets_equal(bet1: &Bet, bet2: &Bet) {
    assert_eq!(bet1.id, bet2.id);
    assert_eq!(bet1.event_id, bet2.event_id);
    assert_eq!(bet1.user_id, bet2.user_id);
    assert_eq!(bet1.option_id, bet2.option_id);
    assert_eq!(bet1.side, bet2.side);
    assert_eq!(bet1.amount, bet2.amount);
    assert_eq!(bet1.locked_multiplier, bet2.locked_multiplier);
    assert_eq!(bet1.status, bet2.status);
}

/// Postgres-backed ledger plus seeded rows
pub struct TestDatabase {
    pub pool: PgPool,
    pub ledger: PgLedger,
}

impl TestDatabase {
    /// Create TestDatabase from an existing pool (useful with sqlx::test)
    pub async fn from_pool(pool: PgPool) -> Self {
        Self {
            ledger: PgLedger::new(pool.clone()),
            pool,
        }
    }

    /// Clean up all test data
    pub async fn cleanup(&self) {
        sqlx::query("TRUNCATE TABLE bets, bet_options, events, users CASCADE")
            .execute(&self.pool)
            .await
            .expect("Failed to cleanup test data");
    }

    pub async fn create_user(&self, balance: i64) -> User {
        self.ledger
            .create_user(balance)
            .await
            .expect("Failed to create test user")
    }

    pub async fn create_event(&self) -> Event {
        self.ledger
            .create_event()
            .await
            .expect("Failed to create test event")
    }

    pub async fn create_option(&self, event_id: Uuid, label: &str) -> BetOption {
        self.ledger
            .create_option(event_id, label, dec("2.00"))
            .await
            .expect("Failed to create test option")
    }

    pub async fn balance(&self, user_id: Uuid) -> i64 {
        self.ledger
            .find_user(user_id)
            .await
            .expect("Failed to load user")
            .expect("User should exist")
            .token_balance
    }
}
