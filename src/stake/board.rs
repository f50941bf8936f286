use super::calculator::MultiplierState;
use crate::models::MultiplierPair;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Last published multipliers for one option
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedStake {
    pub state: MultiplierState,
    /// Monotonic per option, bumped on every publish
    pub version: i64,
    pub published_at: DateTime<Utc>,
}

impl PublishedStake {
    pub fn pair(&self) -> MultiplierPair {
        self.state.display()
    }
}

/// Versioned cache of published multipliers.
///
/// Values here may lag persisted wager totals by one recompute cycle.
/// Bets copy the display pair at placement, so the lag never reaches a
/// locked multiplier after the fact.
#[derive(Debug, Default)]
pub struct StakeBoard {
    entries: RwLock<HashMap<Uuid, PublishedStake>>,
}

impl StakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a freshly computed state, returning the new entry
    pub async fn publish(&self, option_id: Uuid, state: MultiplierState) -> PublishedStake {
        let mut entries = self.entries.write().await;
        let version = entries.get(&option_id).map(|e| e.version + 1).unwrap_or(1);
        let entry = PublishedStake {
            state,
            version,
            published_at: Utc::now(),
        };
        entries.insert(option_id, entry.clone());
        entry
    }

    /// Load a persisted pair, keeping whichever of cache and store is newer
    pub async fn seed(&self, option_id: Uuid, pair: MultiplierPair, version: i64) {
        let mut entries = self.entries.write().await;
        let stale = entries
            .get(&option_id)
            .map(|e| e.version < version)
            .unwrap_or(true);
        if stale {
            entries.insert(
                option_id,
                PublishedStake {
                    state: MultiplierState::from(pair),
                    version,
                    published_at: Utc::now(),
                },
            );
        }
    }

    /// Display pair currently published for an option
    pub async fn current(&self, option_id: Uuid) -> Option<MultiplierPair> {
        self.entries.read().await.get(&option_id).map(PublishedStake::pair)
    }

    /// Published entry including full-precision state and version
    pub async fn snapshot(&self, option_id: Uuid) -> Option<PublishedStake> {
        self.entries.read().await.get(&option_id).cloned()
    }

    /// Full-precision state to ease from on the next recompute
    pub async fn previous_state(&self, option_id: Uuid) -> Option<MultiplierState> {
        self.entries.read().await.get(&option_id).map(|e| e.state)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
