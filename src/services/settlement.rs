use crate::error::{checked_tokens, decimal_to_tokens, AppError, AppResult};
use crate::ledger::{LedgerStore, LedgerTx};
use crate::models::{Bet, BetStatus, Event, User};
use crate::services::AuditTrail;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Balance effect of one settlement call on one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSettlement {
    pub user_id: Uuid,
    pub credited: i64,
    pub debited: i64,
    pub new_balance: i64,
    /// Part of a revert debit that could not be taken because the balance hit zero
    pub clamped_shortfall: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub event: Event,
    pub bets: Vec<Bet>,
    pub affected_users: Vec<UserSettlement>,
    pub total_credited: i64,
}

impl SettlementReport {
    pub fn bets_won(&self) -> usize {
        self.bets.iter().filter(|b| b.status == BetStatus::Won).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResettleReport {
    pub event: Event,
    pub previous_winning_option_ids: Vec<Uuid>,
    pub bets: Vec<Bet>,
    pub affected_users: Vec<UserSettlement>,
    /// Payouts taken back from the previous settlement
    pub total_reverted: i64,
    /// Payouts issued under the new winners
    pub total_credited: i64,
    pub clamped_shortfall: i64,
}

/// Working copy of the users touched by one settlement transaction
struct UserBook {
    entries: BTreeMap<Uuid, BookEntry>,
}

struct BookEntry {
    user: User,
    balance: i64,
    winnings: i64,
    credited: i64,
    debited: i64,
    shortfall: i64,
}

impl UserBook {
    /// Lock every bettor's row in ascending id order
    async fn load(tx: &mut dyn LedgerTx, bets: &[Bet]) -> AppResult<Self> {
        let user_ids: BTreeSet<Uuid> = bets.iter().map(|b| b.user_id).collect();
        let mut entries = BTreeMap::new();
        for user_id in user_ids {
            let user = tx.get_user(user_id).await?.ok_or_else(|| {
                AppError::NotFound(format!("User {} referenced by a bet not found", user_id))
            })?;
            entries.insert(
                user_id,
                BookEntry {
                    balance: user.token_balance,
                    winnings: user.cumulative_winnings,
                    user,
                    credited: 0,
                    debited: 0,
                    shortfall: 0,
                },
            );
        }
        Ok(Self { entries })
    }

    fn entry(&mut self, user_id: Uuid) -> AppResult<&mut BookEntry> {
        self.entries
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not loaded", user_id)))
    }

    fn credit(&mut self, user_id: Uuid, amount: i64) -> AppResult<()> {
        let e = self.entry(user_id)?;
        e.balance = checked_tokens(e.balance.checked_add(amount), "settlement credit")?;
        e.winnings = checked_tokens(e.winnings.checked_add(amount), "cumulative winnings")?;
        e.credited = checked_tokens(e.credited.checked_add(amount), "settlement credit")?;
        Ok(())
    }

    /// Debit clamped at zero balance; returns the shortfall that was dropped
    fn debit_clamped(&mut self, user_id: Uuid, amount: i64) -> AppResult<i64> {
        let e = self.entry(user_id)?;
        let taken = amount.min(e.balance.max(0));
        let shortfall = amount - taken;
        e.balance -= taken;
        e.winnings = checked_tokens(e.winnings.checked_sub(amount), "cumulative winnings")?;
        e.debited = checked_tokens(e.debited.checked_add(amount), "revert debit")?;
        e.shortfall += shortfall;
        Ok(shortfall)
    }

    /// Write changed users back and summarize them
    async fn flush(self, tx: &mut dyn LedgerTx) -> AppResult<Vec<UserSettlement>> {
        let mut affected = Vec::new();
        for (user_id, e) in self.entries {
            if e.credited == 0 && e.debited == 0 {
                continue;
            }
            let changed = e.balance != e.user.token_balance || e.winnings != e.user.cumulative_winnings;
            if changed {
                tx.update_user_balance(user_id, e.balance, e.winnings).await?;
            }
            affected.push(UserSettlement {
                user_id,
                credited: e.credited,
                debited: e.debited,
                new_balance: e.balance,
                clamped_shortfall: e.shortfall,
            });
        }
        Ok(affected)
    }
}

fn payout_tokens(bet: &Bet) -> AppResult<i64> {
    let payout = bet
        .payout()
        .ok_or_else(|| AppError::Validation(format!("Payout overflow on bet {}", bet.id)))?;
    decimal_to_tokens(payout)
}

/// Per-event marker that excludes concurrent settlements in this process.
/// Released on drop.
struct SettlementClaim {
    in_progress: Arc<Mutex<HashSet<Uuid>>>,
    event_id: Uuid,
}

impl Drop for SettlementClaim {
    fn drop(&mut self) {
        let mut set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.event_id);
    }
}

/// Resolves events into won/lost bets and balance changes
pub struct SettlementService {
    ledger: Arc<dyn LedgerStore>,
    in_progress: Arc<Mutex<HashSet<Uuid>>>,
    audit: Option<Arc<AuditTrail>>,
}

impl SettlementService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            in_progress: Arc::new(Mutex::new(HashSet::new())),
            audit: None,
        }
    }

    pub fn with_audit_trail(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn claim(&self, event_id: Uuid) -> AppResult<SettlementClaim> {
        let mut set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(event_id) {
            return Err(AppError::InvalidStateTransition(format!(
                "Settlement of event {} already in progress",
                event_id
            )));
        }
        Ok(SettlementClaim {
            in_progress: self.in_progress.clone(),
            event_id,
        })
    }

    /// Settle an active event with the given winning options
    pub async fn settle(&self, event_id: Uuid, winning_option_ids: &[Uuid]) -> AppResult<SettlementReport> {
        info!("Settling event {} with winners {:?}", event_id, winning_option_ids);

        let _claim = self.claim(event_id)?;
        let winners = normalize_winners(winning_option_ids);

        let mut tx = self.ledger.begin().await?;
        let mut event = tx
            .claim_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;

        if !event.is_active() {
            return Err(AppError::InvalidStateTransition(format!(
                "Event {} is already settled; use resettle to correct it",
                event_id
            )));
        }
        check_winners(tx.as_mut(), event_id, &winners).await?;

        let mut bets = tx.get_bets_for_event(event_id).await?;
        if let Some(bet) = bets.iter().find(|b| !b.is_active()) {
            return Err(AppError::InvalidStateTransition(format!(
                "Bet {} on active event {} is already {}",
                bet.id,
                event_id,
                bet.status.as_str()
            )));
        }

        let mut book = UserBook::load(tx.as_mut(), &bets).await?;
        let total_credited = apply_outcome(tx.as_mut(), &mut bets, &winners, &mut book).await?;

        event.mark_settled(winners);
        tx.update_event(&event).await?;
        let affected_users = book.flush(tx.as_mut()).await?;
        tx.commit().await?;

        let report = SettlementReport {
            event,
            bets,
            affected_users,
            total_credited,
        };

        info!(
            "Event {} settled: {} of {} bets won, {} tokens credited to {} users",
            event_id,
            report.bets_won(),
            report.bets.len(),
            total_credited,
            report.affected_users.len()
        );

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_event_settled(&report).await {
                warn!("Failed to write audit entry for settlement of {}: {}", event_id, e);
            }
        }

        Ok(report)
    }

    /// Replace the outcome of a settled event.
    ///
    /// Reverts every previous payout and applies the new winners in one
    /// transaction, so readers only ever see the old or the new settlement.
    /// Cost is linear in the number of bets on the event.
    pub async fn resettle(
        &self,
        event_id: Uuid,
        new_winning_option_ids: &[Uuid],
    ) -> AppResult<ResettleReport> {
        info!(
            "Resettling event {} with winners {:?}",
            event_id, new_winning_option_ids
        );

        let _claim = self.claim(event_id)?;
        let winners = normalize_winners(new_winning_option_ids);

        let mut tx = self.ledger.begin().await?;
        let mut event = tx
            .claim_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;

        if !event.is_settled() {
            return Err(AppError::InvalidStateTransition(format!(
                "Event {} has not been settled, nothing to revert",
                event_id
            )));
        }
        check_winners(tx.as_mut(), event_id, &winners).await?;

        let mut bets = tx.get_bets_for_event(event_id).await?;
        let mut book = UserBook::load(tx.as_mut(), &bets).await?;

        let (total_reverted, clamped_shortfall) = revert_outcome(&mut bets, &mut book)?;
        let total_credited = apply_outcome(tx.as_mut(), &mut bets, &winners, &mut book).await?;

        // Status stays settled throughout; only winners and timestamp change
        let previous_winning_option_ids = std::mem::take(&mut event.winning_option_ids);
        event.mark_settled(winners);
        tx.update_event(&event).await?;
        let affected_users = book.flush(tx.as_mut()).await?;
        tx.commit().await?;

        info!(
            "Event {} resettled: reverted {}, credited {}, clamped {}",
            event_id, total_reverted, total_credited, clamped_shortfall
        );

        let report = ResettleReport {
            event,
            previous_winning_option_ids,
            bets,
            affected_users,
            total_reverted,
            total_credited,
            clamped_shortfall,
        };

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_event_resettled(&report).await {
                warn!("Failed to write audit entry for resettlement of {}: {}", event_id, e);
            }
        }

        Ok(report)
    }
}

fn normalize_winners(ids: &[Uuid]) -> Vec<Uuid> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Every declared winner must be an option of the event
async fn check_winners(tx: &mut dyn LedgerTx, event_id: Uuid, winners: &[Uuid]) -> AppResult<()> {
    if winners.is_empty() {
        return Ok(());
    }
    let options: HashSet<Uuid> = tx
        .get_options_for_event(event_id)
        .await?
        .into_iter()
        .map(|o| o.id)
        .collect();
    if let Some(stray) = winners.iter().find(|id| !options.contains(id)) {
        return Err(AppError::Validation(format!(
            "Option {} is not an option of event {}",
            stray, event_id
        )));
    }
    Ok(())
}

/// Mark each active bet won or lost and credit winners.
/// Returns the total credited.
async fn apply_outcome(
    tx: &mut dyn LedgerTx,
    bets: &mut [Bet],
    winners: &[Uuid],
    book: &mut UserBook,
) -> AppResult<i64> {
    let mut total_credited = 0i64;
    for bet in bets.iter_mut() {
        if bet.wins_under(winners) {
            let payout = payout_tokens(bet)?;
            book.credit(bet.user_id, payout)?;
            total_credited = checked_tokens(total_credited.checked_add(payout), "settlement total")?;
            bet.status = BetStatus::Won;
            debug!("Bet {} won, crediting {} to {}", bet.id, payout, bet.user_id);
        } else {
            bet.status = BetStatus::Lost;
            debug!("Bet {} lost", bet.id);
        }
        tx.upsert_bet(bet).await?;
    }
    Ok(total_credited)
}

/// Take back every payout of the previous settlement and reset bets to active.
/// Returns (total reverted, total clamped away).
fn revert_outcome(bets: &mut [Bet], book: &mut UserBook) -> AppResult<(i64, i64)> {
    let mut total_reverted = 0i64;
    let mut total_shortfall = 0i64;
    for bet in bets.iter_mut() {
        match bet.status {
            BetStatus::Won => {
                let payout = payout_tokens(bet)?;
                let shortfall = book.debit_clamped(bet.user_id, payout)?;
                if shortfall > 0 {
                    warn!(
                        "Revert of bet {} clamped user {} at zero, {} tokens not recovered",
                        bet.id, bet.user_id, shortfall
                    );
                }
                total_reverted = checked_tokens(total_reverted.checked_add(payout), "revert total")?;
                total_shortfall += shortfall;
            }
            BetStatus::Lost => {}
            BetStatus::Active => {
                return Err(AppError::InvalidStateTransition(format!(
                    "Bet {} is still active on a settled event",
                    bet.id
                )));
            }
        }
        bet.status = BetStatus::Active;
    }
    Ok((total_reverted, total_shortfall))
}
