//! In-process ledger store.
//!
//! Transactions serialize on one async mutex and operate on a private copy
//! of the state, which replaces the shared state on commit.

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Bet, BetOption, Event, EventStatus, MultiplierPair, User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    options: HashMap<Uuid, BetOption>,
    bets: HashMap<Uuid, Bet>,
}

impl LedgerState {
    fn bets_where<F: Fn(&Bet) -> bool>(&self, pred: F) -> Vec<Bet> {
        let mut bets: Vec<Bet> = self.bets.values().filter(|b| pred(b)).cloned().collect();
        bets.sort_by(|a, b| a.placed_at.cmp(&b.placed_at).then(a.id.cmp(&b.id)));
        bets
    }
}

/// Ledger store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with `LedgerError::Injected`
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    // =========================================================================
    // Seeding and inspection (stand-ins for the account and event CRUD layer)
    // =========================================================================

    pub async fn insert_user(&self, user: User) -> User {
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn insert_event(&self, event: Event) -> Event {
        self.state.lock().await.events.insert(event.id, event.clone());
        event
    }

    pub async fn insert_option(&self, option: BetOption) -> BetOption {
        self.state.lock().await.options.insert(option.id, option.clone());
        option
    }

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn event(&self, event_id: Uuid) -> Option<Event> {
        self.state.lock().await.events.get(&event_id).cloned()
    }

    pub async fn bets_for_event(&self, event_id: Uuid) -> Vec<Bet> {
        self.state.lock().await.bets_where(|b| b.event_id == event_id)
    }

    pub async fn bets_for_user(&self, user_id: Uuid) -> Vec<Bet> {
        self.state.lock().await.bets_where(|b| b.user_id == user_id)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLedgerTx {
            guard,
            working,
            failing_commits: self.failing_commits.clone(),
        }))
    }

    async fn get_option(&self, option_id: Uuid) -> LedgerResult<Option<BetOption>> {
        Ok(self.state.lock().await.options.get(&option_id).cloned())
    }

    async fn list_options(&self) -> LedgerResult<Vec<BetOption>> {
        Ok(self.state.lock().await.options.values().cloned().collect())
    }

    async fn active_option_ids(&self) -> LedgerResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .options
            .values()
            .filter(|o| {
                state
                    .events
                    .get(&o.event_id)
                    .map(|e| e.status == EventStatus::Active)
                    .unwrap_or(false)
            })
            .map(|o| o.id)
            .collect())
    }

    async fn total_wagered_on_option(&self, option_id: Uuid) -> LedgerResult<i64> {
        let state = self.state.lock().await;
        state
            .bets
            .values()
            .filter(|b| b.option_id == option_id)
            .try_fold(0i64, |acc, b| acc.checked_add(b.amount))
            .ok_or_else(|| LedgerError::Corrupt(format!("Wager total overflow on option {}", option_id)))
    }

    async fn publish_multipliers(
        &self,
        option_id: Uuid,
        pair: MultiplierPair,
        version: i64,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock().await;
        let option = state
            .options
            .get_mut(&option_id)
            .ok_or_else(|| LedgerError::NotFound(format!("Option {}", option_id)))?;
        if option.multiplier_version < version {
            option.multipliers = pair;
            option.multiplier_version = version;
        }
        Ok(())
    }
}

struct MemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    failing_commits: Arc<AtomicUsize>,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn get_user(&mut self, user_id: Uuid) -> LedgerResult<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn update_user_balance(
        &mut self,
        user_id: Uuid,
        token_balance: i64,
        cumulative_winnings: i64,
    ) -> LedgerResult<User> {
        if token_balance < 0 {
            return Err(LedgerError::ConstraintViolation(format!(
                "Balance of user {} would become {}",
                user_id, token_balance
            )));
        }
        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("User {}", user_id)))?;
        user.token_balance = token_balance;
        user.cumulative_winnings = cumulative_winnings;
        Ok(user.clone())
    }

    async fn get_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>> {
        Ok(self.working.events.get(&event_id).cloned())
    }

    async fn claim_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>> {
        // Holding the store mutex already excludes every other transaction
        self.get_event(event_id).await
    }

    async fn update_event(&mut self, event: &Event) -> LedgerResult<()> {
        match self.working.events.get_mut(&event.id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound(format!("Event {}", event.id))),
        }
    }

    async fn get_option(&mut self, option_id: Uuid) -> LedgerResult<Option<BetOption>> {
        Ok(self.working.options.get(&option_id).cloned())
    }

    async fn get_options_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<BetOption>> {
        let mut options: Vec<BetOption> = self
            .working
            .options
            .values()
            .filter(|o| o.event_id == event_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.id);
        Ok(options)
    }

    async fn get_bets_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<Bet>> {
        Ok(self.working.bets_where(|b| b.event_id == event_id))
    }

    async fn upsert_bet(&mut self, bet: &Bet) -> LedgerResult<()> {
        match self.working.bets.get_mut(&bet.id) {
            Some(stored) => stored.status = bet.status,
            None => {
                if !self.working.users.contains_key(&bet.user_id) {
                    return Err(LedgerError::ConstraintViolation(format!("Unknown user {}", bet.user_id)));
                }
                self.working.bets.insert(bet.id, bet.clone());
            }
        }
        Ok(())
    }

    async fn find_bets_by_placement_key(
        &mut self,
        user_id: Uuid,
        placement_key: &str,
    ) -> LedgerResult<Vec<Bet>> {
        Ok(self
            .working
            .bets_where(|b| b.user_id == user_id && b.placement_key.as_deref() == Some(placement_key)))
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryLedgerTx {
            mut guard,
            working,
            failing_commits,
        } = *self;

        let injected = failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LedgerError::Injected("commit".to_string()));
        }

        *guard = working;
        Ok(())
    }
}
