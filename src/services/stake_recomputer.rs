use crate::error::{AppError, AppResult};
use crate::ledger::LedgerStore;
use crate::stake::{MultiplierState, PublishedStake, StakeBoard, StakeCalculator};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default recompute queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Bounded queue feeding option ids from placement to the recomputer
pub fn channel(capacity: usize) -> (mpsc::Sender<Uuid>, mpsc::Receiver<Uuid>) {
    mpsc::channel(capacity.max(1))
}

/// Background worker that re-derives option multipliers from wager totals
pub struct StakeRecomputer {
    ledger: Arc<dyn LedgerStore>,
    board: Arc<StakeBoard>,
    calculator: StakeCalculator,
    receiver: mpsc::Receiver<Uuid>,
    interval: Duration,
}

impl StakeRecomputer {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        board: Arc<StakeBoard>,
        calculator: StakeCalculator,
        receiver: mpsc::Receiver<Uuid>,
    ) -> Self {
        Self {
            ledger,
            board,
            calculator,
            receiver,
            interval: Duration::from_secs(5),
        }
    }

    /// Set the full sweep interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the process exits. Queued ids are handled as they arrive
    /// and every active option is swept on each tick.
    pub async fn start(mut self) {
        let mut interval = time::interval(self.interval);
        let mut queue_open = true;
        info!("Stake recomputer started, sweeping every {:?}", self.interval);

        loop {
            tokio::select! {
                received = self.receiver.recv(), if queue_open => {
                    match received {
                        Some(option_id) => {
                            if let Err(e) = self.recompute_option(option_id).await {
                                error!("Recompute of option {} failed: {}", option_id, e);
                            }
                        }
                        None => {
                            warn!("Recompute queue closed, continuing with periodic sweeps only");
                            queue_open = false;
                        }
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.recompute_active().await {
                        error!("Error in stake sweep: {}", e);
                    }
                }
            }
        }
    }

    /// Recompute, publish and persist one option's multipliers
    pub async fn recompute_option(&self, option_id: Uuid) -> AppResult<PublishedStake> {
        let total = self.ledger.total_wagered_on_option(option_id).await?;

        let previous = match self.board.previous_state(option_id).await {
            Some(state) => Some(state),
            None => {
                let option = self
                    .ledger
                    .get_option(option_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Option {} not found", option_id)))?;
                // Version 0 means nothing was ever published; seed from base
                (option.multiplier_version > 0).then(|| MultiplierState::from(option.multipliers))
            }
        };

        let state = self.calculator.next(Decimal::from(total), previous)?;
        let published = self.board.publish(option_id, state).await;
        self.ledger
            .publish_multipliers(option_id, published.pair(), published.version)
            .await?;

        debug!(
            "Option {} total {} -> for {} / against {} (v{})",
            option_id,
            total,
            published.pair().for_multiplier,
            published.pair().against_multiplier,
            published.version
        );

        Ok(published)
    }

    /// Sweep every option whose event still accepts bets.
    /// Returns how many options were published.
    pub async fn recompute_active(&self) -> AppResult<usize> {
        let option_ids = self.ledger.active_option_ids().await?;
        let mut published = 0;
        for option_id in option_ids {
            match self.recompute_option(option_id).await {
                Ok(_) => published += 1,
                Err(e) => warn!("Skipping option {} in sweep: {}", option_id, e),
            }
        }
        Ok(published)
    }
}

/// Seed the board from persisted multipliers so a restart resumes easing
/// where it left off. Returns the number of options loaded.
pub async fn warm_board(ledger: &dyn LedgerStore, board: &StakeBoard) -> AppResult<usize> {
    let options = ledger.list_options().await?;
    let count = options.len();
    for option in options {
        board
            .seed(option.id, option.multipliers, option.multiplier_version)
            .await;
    }
    info!("Stake board warmed with {} options", count);
    Ok(count)
}
