use crate::error::{checked_tokens, AppError, AppResult};
use crate::ledger::LedgerStore;
use crate::models::{Bet, BetOption, BetSide};
use crate::services::AuditTrail;
use crate::stake::StakeBoard;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One requested wager in a placement batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerItem {
    pub event_id: Uuid,
    pub option_id: Uuid,
    pub side: BetSide,
    pub amount: i64,
}

/// Outcome of a successful placement
#[derive(Debug, Clone, Serialize)]
pub struct PlacementReceipt {
    pub bets: Vec<Bet>,
    pub new_balance: i64,
    /// True when an idempotency key matched an earlier placement and nothing was written
    pub replayed: bool,
}

/// Service turning betting intent into persisted bets and a balance debit
pub struct WagerService {
    ledger: Arc<dyn LedgerStore>,
    board: Arc<StakeBoard>,
    recompute_tx: Option<mpsc::Sender<Uuid>>,
    audit: Option<Arc<AuditTrail>>,
}

impl WagerService {
    pub fn new(ledger: Arc<dyn LedgerStore>, board: Arc<StakeBoard>) -> Self {
        Self {
            ledger,
            board,
            recompute_tx: None,
            audit: None,
        }
    }

    /// Queue affected options for multiplier recomputation after each placement
    pub fn with_recompute_sender(mut self, sender: mpsc::Sender<Uuid>) -> Self {
        self.recompute_tx = Some(sender);
        self
    }

    pub fn with_audit_trail(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Place a batch of bets for one user.
    ///
    /// Either every bet is created and the balance is debited once by the
    /// batch total, or nothing is written.
    pub async fn place_bets(
        &self,
        user_id: Uuid,
        items: &[WagerItem],
        idempotency_key: Option<&str>,
    ) -> AppResult<PlacementReceipt> {
        info!(
            "Placing bets: user={}, items={}, key={:?}",
            user_id,
            items.len(),
            idempotency_key
        );

        let total = validate_items(items)?;
        if idempotency_key.map(str::is_empty).unwrap_or(false) {
            return Err(AppError::Validation("Idempotency key must not be empty".into()));
        }

        let mut tx = self.ledger.begin().await?;

        // Lock events in ascending id order before the user row
        let event_ids: BTreeSet<Uuid> = items.iter().map(|i| i.event_id).collect();
        let mut events = Vec::with_capacity(event_ids.len());
        for event_id in &event_ids {
            let event = tx
                .get_event(*event_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
            events.push(event);
        }

        let user = tx
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        if let Some(key) = idempotency_key {
            let existing = tx.find_bets_by_placement_key(user_id, key).await?;
            if !existing.is_empty() {
                info!(
                    "Placement key {} already used by user {} ({} bets), replaying",
                    key,
                    user_id,
                    existing.len()
                );
                return Ok(PlacementReceipt {
                    bets: existing,
                    new_balance: user.token_balance,
                    replayed: true,
                });
            }
        }

        if let Some(closed) = events.iter().find(|e| !e.is_active()) {
            return Err(AppError::EventNotActive(closed.id));
        }

        if total > user.token_balance {
            return Err(AppError::InsufficientBalance {
                required: total,
                available: user.token_balance,
            });
        }

        let mut options: HashMap<Uuid, BetOption> = HashMap::new();
        for item in items {
            if options.contains_key(&item.option_id) {
                continue;
            }
            let option = tx
                .get_option(item.option_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Option {} not found", item.option_id)))?;
            if option.event_id != item.event_id {
                return Err(AppError::Validation(format!(
                    "Option {} does not belong to event {}",
                    option.id, item.event_id
                )));
            }
            options.insert(option.id, option);
        }

        let mut bets = Vec::with_capacity(items.len());
        for item in items {
            let option = &options[&item.option_id];
            // Board values may lag one recompute cycle; the persisted pair covers a cold board
            let pair = self
                .board
                .current(option.id)
                .await
                .unwrap_or(option.multipliers);
            let bet = Bet::new(
                user_id,
                item.event_id,
                item.option_id,
                item.side,
                item.amount,
                pair.for_side(item.side),
            )
            .with_placement_key(idempotency_key.map(str::to_string));
            bet.validate().map_err(AppError::Validation)?;

            debug!(
                "Bet {} locks multiplier {} on option {} ({})",
                bet.id,
                bet.locked_multiplier,
                bet.option_id,
                bet.side.as_str()
            );
            tx.upsert_bet(&bet).await?;
            bets.push(bet);
        }

        let updated = tx
            .update_user_balance(user_id, user.token_balance - total, user.cumulative_winnings)
            .await?;
        tx.commit().await?;

        info!(
            "Placed {} bets for user {}: debited {}, balance {}",
            bets.len(),
            user_id,
            total,
            updated.token_balance
        );

        self.request_recompute(options.keys().copied());

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_bets_placed(user_id, &bets, updated.token_balance).await {
                warn!("Failed to write audit entry for placement by {}: {}", user_id, e);
            }
        }

        Ok(PlacementReceipt {
            bets,
            new_balance: updated.token_balance,
            replayed: false,
        })
    }

    /// Hand option ids to the recomputer without waiting on it
    fn request_recompute(&self, option_ids: impl Iterator<Item = Uuid>) {
        let Some(sender) = &self.recompute_tx else {
            return;
        };
        for option_id in option_ids {
            match sender.try_send(option_id) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Recompute queue full, option {} waits for the next tick", option_id)
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Recompute worker is gone, option {} not queued", option_id)
                }
            }
        }
    }
}

/// Returns the batch total
fn validate_items(items: &[WagerItem]) -> AppResult<i64> {
    if items.is_empty() {
        return Err(AppError::Validation("At least one bet is required".into()));
    }

    items.iter().try_fold(0i64, |acc, item| {
        if item.amount <= 0 {
            return Err(AppError::Validation(format!(
                "Amount must be positive (option {})",
                item.option_id
            )));
        }
        checked_tokens(acc.checked_add(item.amount), "placement total")
    })
}
