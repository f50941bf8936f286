//! Entry point consumed by the surrounding request layer.

use crate::error::{option_to_result, AppResult};
use crate::ledger::LedgerStore;
use crate::models::MultiplierPair;
use crate::services::stake_recomputer::{self, StakeRecomputer};
use crate::services::{
    AuditTrail, PlacementReceipt, ResettleReport, SettlementReport, SettlementService, WagerItem,
    WagerService,
};
use crate::stake::{StakeBoard, StakeCalculator};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Wires the ledger, stake board and services behind the inbound operations
pub struct WagerEngine {
    ledger: Arc<dyn LedgerStore>,
    board: Arc<StakeBoard>,
    calculator: StakeCalculator,
    wagers: WagerService,
    settlement: SettlementService,
}

impl WagerEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, calculator: StakeCalculator) -> Self {
        let board = Arc::new(StakeBoard::new());
        Self {
            wagers: WagerService::new(ledger.clone(), board.clone()),
            settlement: SettlementService::new(ledger.clone()),
            ledger,
            board,
            calculator,
        }
    }

    /// Record committed operations to `audit`
    pub fn with_audit_trail(mut self, audit: Arc<AuditTrail>) -> Self {
        self.wagers = self.wagers.with_audit_trail(audit.clone());
        self.settlement = self.settlement.with_audit_trail(audit);
        self
    }

    /// Build the background recomputer and connect placement to its queue.
    /// The caller decides where to run [`StakeRecomputer::start`].
    pub fn with_recomputer(
        mut self,
        queue_capacity: usize,
        interval: Duration,
    ) -> (Self, StakeRecomputer) {
        let (sender, receiver) = stake_recomputer::channel(queue_capacity);
        self.wagers = self.wagers.with_recompute_sender(sender);
        let recomputer = StakeRecomputer::new(
            self.ledger.clone(),
            self.board.clone(),
            self.calculator.clone(),
            receiver,
        )
        .with_interval(interval);
        (self, recomputer)
    }

    pub fn board(&self) -> &Arc<StakeBoard> {
        &self.board
    }

    /// Load persisted multipliers into the board
    pub async fn warm_board(&self) -> AppResult<usize> {
        stake_recomputer::warm_board(self.ledger.as_ref(), &self.board).await
    }

    pub async fn place_bets(
        &self,
        user_id: Uuid,
        items: &[WagerItem],
        idempotency_key: Option<&str>,
    ) -> AppResult<PlacementReceipt> {
        self.wagers.place_bets(user_id, items, idempotency_key).await
    }

    pub async fn settle(&self, event_id: Uuid, winning_option_ids: &[Uuid]) -> AppResult<SettlementReport> {
        self.settlement.settle(event_id, winning_option_ids).await
    }

    pub async fn resettle(
        &self,
        event_id: Uuid,
        new_winning_option_ids: &[Uuid],
    ) -> AppResult<ResettleReport> {
        self.settlement.resettle(event_id, new_winning_option_ids).await
    }

    /// Published pair for an option, falling back to the persisted one
    pub async fn get_current_multiplier(&self, option_id: Uuid) -> AppResult<MultiplierPair> {
        if let Some(pair) = self.board.current(option_id).await {
            return Ok(pair);
        }
        let option = self.ledger.get_option(option_id).await?;
        option_to_result(
            option.map(|o| o.multipliers),
            &format!("Option {} not found", option_id),
        )
    }
}
