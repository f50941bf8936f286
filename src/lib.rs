//! Wager Engine Library
//!
//! Stake calculation, bet placement and event settlement over a
//! transactional ledger store.

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod stake;

// Re-export commonly used types
pub use config::AppConfig;
pub use engine::WagerEngine;
pub use error::{AppError, AppResult, LedgerError};
pub use ledger::{LedgerStore, LedgerTx, MemoryLedger, PgLedger};
pub use services::{PlacementReceipt, ResettleReport, SettlementReport, UserSettlement, WagerItem};
pub use stake::{StakeBoard, StakeCalculator, StakeParams};
