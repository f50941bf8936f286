pub mod audit;
pub mod settlement;
pub mod stake_recomputer;
pub mod wager_service;

pub use audit::{AuditLogEntry, AuditTrail};
pub use settlement::{ResettleReport, SettlementReport, SettlementService, UserSettlement};
pub use stake_recomputer::{warm_board, StakeRecomputer};
pub use wager_service::{PlacementReceipt, WagerItem, WagerService};
