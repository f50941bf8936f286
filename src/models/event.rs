use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Settled,
}

impl EventStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "active" => Ok(EventStatus::Active),
            "settled" => Ok(EventStatus::Settled),
            _ => Err(format!("Invalid event status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Settled => "settled",
        }
    }
}

impl From<EventStatus> for String {
    fn from(status: EventStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Outcome container that bets are placed against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub status: EventStatus,
    /// Empty until settled
    pub winning_option_ids: Vec<Uuid>,
    pub created_at: NaiveDateTime,
    pub settled_at: Option<NaiveDateTime>,
}

impl Event {
    /// Create a new active Event
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: EventStatus::Active,
            winning_option_ids: Vec::new(),
            created_at: chrono::Utc::now().naive_utc(),
            settled_at: None,
        }
    }

    /// Check if event is accepting bets
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    /// Check if event has been settled
    pub fn is_settled(&self) -> bool {
        self.status == EventStatus::Settled
    }

    /// Record a settlement outcome
    pub fn mark_settled(&mut self, winning_option_ids: Vec<Uuid>) {
        self.status = EventStatus::Settled;
        self.winning_option_ids = winning_option_ids;
        self.settled_at = Some(chrono::Utc::now().naive_utc());
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
