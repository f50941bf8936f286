//! PostgreSQL ledger store.
//!
//! User rows are locked `FOR UPDATE`. Placements share-lock their events
//! (`FOR SHARE`), so bets on one event from different users do not queue
//! behind each other. `claim_event` takes the exclusive lock with `NOWAIT`,
//! which fails fast with `LedgerError::Contended` while any placement or
//! other settlement holds the row.

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Bet, BetOption, BetSide, BetStatus, Event, EventStatus, MultiplierPair, User};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, token_balance, cumulative_winnings, created_at";
const EVENT_COLUMNS: &str = "id, status, winning_option_ids, created_at, settled_at";
const OPTION_COLUMNS: &str =
    "id, event_id, label, for_multiplier, against_multiplier, multiplier_version";
const BET_COLUMNS: &str = "id, user_id, event_id, option_id, side, amount, locked_multiplier, \
                           status, placement_key, placed_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    token_balance: i64,
    cumulative_winnings: i64,
    created_at: NaiveDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            token_balance: row.token_balance,
            cumulative_winnings: row.cumulative_winnings,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    status: String, // Stored as TEXT, decoded into EventStatus
    winning_option_ids: Vec<Uuid>,
    created_at: NaiveDateTime,
    settled_at: Option<NaiveDateTime>,
}

impl TryFrom<EventRow> for Event {
    type Error = LedgerError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            status: EventStatus::from_str(&row.status).map_err(LedgerError::Corrupt)?,
            winning_option_ids: row.winning_option_ids,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OptionRow {
    id: Uuid,
    event_id: Uuid,
    label: String,
    for_multiplier: Decimal,
    against_multiplier: Decimal,
    multiplier_version: i64,
}

impl From<OptionRow> for BetOption {
    fn from(row: OptionRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            label: row.label,
            multipliers: MultiplierPair::new(row.for_multiplier, row.against_multiplier),
            multiplier_version: row.multiplier_version,
        }
    }
}

#[derive(Debug, FromRow)]
struct BetRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    option_id: Uuid,
    side: String,
    amount: i64,
    locked_multiplier: Decimal, // NUMERIC(10, 2)
    status: String,
    placement_key: Option<String>,
    placed_at: NaiveDateTime,
}

impl TryFrom<BetRow> for Bet {
    type Error = LedgerError;

    fn try_from(row: BetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            option_id: row.option_id,
            side: BetSide::from_str(&row.side).map_err(LedgerError::Corrupt)?,
            amount: row.amount,
            locked_multiplier: row.locked_multiplier,
            status: BetStatus::from_str(&row.status).map_err(LedgerError::Corrupt)?,
            placement_key: row.placement_key,
            placed_at: row.placed_at,
        })
    }
}

fn decode_bets(rows: Vec<BetRow>) -> LedgerResult<Vec<Bet>> {
    rows.into_iter().map(Bet::try_from).collect()
}

/// Ledger store backed by PostgreSQL
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Create a new PgLedger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // Seeding (stand-ins for the account and event CRUD layer)
    // =========================================================================

    /// Insert a user with an opening balance
    pub async fn create_user(&self, token_balance: i64) -> LedgerResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (token_balance) VALUES ($1) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(token_balance)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Insert an active event
    pub async fn create_event(&self) -> LedgerResult<Event> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "INSERT INTO events DEFAULT VALUES RETURNING {}",
            EVENT_COLUMNS
        ))
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    /// Insert an option seeded with a neutral multiplier
    pub async fn create_option(
        &self,
        event_id: Uuid,
        label: &str,
        neutral: Decimal,
    ) -> LedgerResult<BetOption> {
        let row = sqlx::query_as::<_, OptionRow>(&format!(
            r#"
            INSERT INTO bet_options (event_id, label, for_multiplier, against_multiplier)
            VALUES ($1, $2, $3, $3)
            RETURNING {}
            "#,
            OPTION_COLUMNS
        ))
        .bind(event_id)
        .bind(label)
        .bind(neutral)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn find_user(&self, user_id: Uuid) -> LedgerResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn find_bets_for_event(&self, event_id: Uuid) -> LedgerResult<Vec<Bet>> {
        let rows = sqlx::query_as::<_, BetRow>(&format!(
            "SELECT {} FROM bets WHERE event_id = $1 ORDER BY placed_at, id",
            BET_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        decode_bets(rows)
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn get_option(&self, option_id: Uuid) -> LedgerResult<Option<BetOption>> {
        let row = sqlx::query_as::<_, OptionRow>(&format!(
            "SELECT {} FROM bet_options WHERE id = $1",
            OPTION_COLUMNS
        ))
        .bind(option_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BetOption::from))
    }

    async fn list_options(&self) -> LedgerResult<Vec<BetOption>> {
        let rows = sqlx::query_as::<_, OptionRow>(&format!(
            "SELECT {} FROM bet_options",
            OPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BetOption::from).collect())
    }

    async fn active_option_ids(&self) -> LedgerResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT o.id
            FROM bet_options o
            JOIN events e ON e.id = o.event_id
            WHERE e.status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn total_wagered_on_option(&self, option_id: Uuid) -> LedgerResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM bets WHERE option_id = $1",
        )
        .bind(option_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn publish_multipliers(
        &self,
        option_id: Uuid,
        pair: MultiplierPair,
        version: i64,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE bet_options
            SET for_multiplier = $2, against_multiplier = $3, multiplier_version = $4
            WHERE id = $1 AND multiplier_version < $4
            "#,
        )
        .bind(option_id)
        .bind(pair.for_multiplier)
        .bind(pair.against_multiplier)
        .bind(version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    async fn fetch_event(&mut self, event_id: Uuid, lock: &str) -> LedgerResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE id = $1 {}",
            EVENT_COLUMNS, lock
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Event::try_from).transpose()
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn get_user(&mut self, user_id: Uuid) -> LedgerResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(User::from))
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

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET token_balance = $2, cumulative_winnings = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(token_balance)
        .bind(cumulative_winnings)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("User {}", user_id)))?;

        Ok(row.into())
    }

    async fn get_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>> {
        self.fetch_event(event_id, "FOR SHARE").await
    }

    async fn claim_event(&mut self, event_id: Uuid) -> LedgerResult<Option<Event>> {
        self.fetch_event(event_id, "FOR UPDATE NOWAIT").await
    }

    async fn update_event(&mut self, event: &Event) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = $2, winning_option_ids = $3, settled_at = $4
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(event.status.as_str())
        .bind(event.winning_option_ids.clone())
        .bind(event.settled_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("Event {}", event.id)));
        }
        Ok(())
    }

    async fn get_option(&mut self, option_id: Uuid) -> LedgerResult<Option<BetOption>> {
        let row = sqlx::query_as::<_, OptionRow>(&format!(
            "SELECT {} FROM bet_options WHERE id = $1",
            OPTION_COLUMNS
        ))
        .bind(option_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(BetOption::from))
    }

    async fn get_options_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<BetOption>> {
        let rows = sqlx::query_as::<_, OptionRow>(&format!(
            "SELECT {} FROM bet_options WHERE event_id = $1 ORDER BY id",
            OPTION_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(BetOption::from).collect())
    }

    async fn get_bets_for_event(&mut self, event_id: Uuid) -> LedgerResult<Vec<Bet>> {
        let rows = sqlx::query_as::<_, BetRow>(&format!(
            "SELECT {} FROM bets WHERE event_id = $1 ORDER BY placed_at, id FOR UPDATE",
            BET_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&mut *self.tx)
        .await?;

        decode_bets(rows)
    }

    async fn upsert_bet(&mut self, bet: &Bet) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bets
                (id, user_id, event_id, option_id, side, amount, locked_multiplier, status, placement_key, placed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(bet.id)
        .bind(bet.user_id)
        .bind(bet.event_id)
        .bind(bet.option_id)
        .bind(bet.side.as_str())
        .bind(bet.amount)
        .bind(bet.locked_multiplier)
        .bind(bet.status.as_str())
        .bind(bet.placement_key.as_deref())
        .bind(bet.placed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_bets_by_placement_key(
        &mut self,
        user_id: Uuid,
        placement_key: &str,
    ) -> LedgerResult<Vec<Bet>> {
        let rows = sqlx::query_as::<_, BetRow>(&format!(
            "SELECT {} FROM bets WHERE user_id = $1 AND placement_key = $2 ORDER BY placed_at, id",
            BET_COLUMNS
        ))
        .bind(user_id)
        .bind(placement_key)
        .fetch_all(&mut *self.tx)
        .await?;

        decode_bets(rows)
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
