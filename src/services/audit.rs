use crate::error::AppResult;
use crate::models::Bet;
use crate::services::settlement::{ResettleReport, SettlementReport};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "bets_placed", "event_settled", "event_resettled"
    pub event_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Append-only JSON-lines record of committed ledger operations
pub struct AuditTrail {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrail {
    /// Open (or create) today's audit file under `log_directory`
    pub fn new(log_directory: impl AsRef<Path>) -> AppResult<Self> {
        let log_directory = log_directory.as_ref();
        std::fs::create_dir_all(log_directory)?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        let file = OpenOptions::new().create(true).append(true).open(&log_file)?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_file
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)?;
        file.flush()?;

        Ok(())
    }

    /// Log a committed placement batch
    pub async fn log_bets_placed(&self, user_id: Uuid, bets: &[Bet], new_balance: i64) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "bets_placed".to_string(),
            event_id: None,
            user_id: Some(user_id),
            details: serde_json::json!({
                "bets": bets.iter().map(|b| serde_json::json!({
                    "bet_id": b.id.to_string(),
                    "event_id": b.event_id.to_string(),
                    "option_id": b.option_id.to_string(),
                    "side": b.side.as_str(),
                    "amount": b.amount,
                    "locked_multiplier": b.locked_multiplier.to_string(),
                })).collect::<Vec<_>>(),
                "new_balance": new_balance,
            }),
        };

        self.log(entry).await
    }

    /// Log a first settlement
    pub async fn log_event_settled(&self, report: &SettlementReport) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "event_settled".to_string(),
            event_id: Some(report.event.id),
            user_id: None,
            details: serde_json::json!({
                "winning_option_ids": report.event.winning_option_ids,
                "bets_won": report.bets_won(),
                "bets_lost": report.bets.len() - report.bets_won(),
                "total_credited": report.total_credited,
                "affected_users": report.affected_users,
            }),
        };

        self.log(entry).await
    }

    /// Log a corrected settlement
    pub async fn log_event_resettled(&self, report: &ResettleReport) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "event_resettled".to_string(),
            event_id: Some(report.event.id),
            user_id: None,
            details: serde_json::json!({
                "previous_winning_option_ids": report.previous_winning_option_ids,
                "winning_option_ids": report.event.winning_option_ids,
                "total_reverted": report.total_reverted,
                "total_credited": report.total_credited,
                "clamped_shortfall": report.clamped_shortfall,
                "affected_users": report.affected_users,
            }),
        };

        self.log(entry).await
    }
}
