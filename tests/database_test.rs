//! Postgres ledger tests. Run with `DATABASE_URL` set and `--ignored`.

mod helpers;

use helpers::*;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use wager_engine::ledger::{LedgerStore, LedgerTx};
use wager_engine::models::*;
use wager_engine::{AppError, LedgerError, StakeCalculator, WagerEngine, WagerItem};

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_migrations_ran(pool: PgPool) {
    for table in ["users", "events", "bet_options", "bets"] {
        let exists: bool = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
        assert!(exists, "Table {} should exist", table);
    }
}

// ============================================================================
// Ledger Transaction Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dropped_transaction_rolls_back(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    db.cleanup().await;
    let user = db.create_user(500).await;

    {
        let mut tx = db.ledger.begin().await.unwrap();
        tx.update_user_balance(user.id, 1, 0).await.unwrap();
    }

    assert_eq!(db.balance(user.id).await, 500);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_bet_upsert_keeps_frozen_fields(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    db.cleanup().await;
    let user = db.create_user(500).await;
    let event = db.create_event().await;
    let option = db.create_option(event.id, "offer").await;

    let mut bet = Bet::new(user.id, event.id, option.id, BetSide::Against, 40, dec("2.25"))
        .with_placement_key(Some("k".to_string()));
    let mut tx = db.ledger.begin().await.unwrap();
    tx.upsert_bet(&bet).await.unwrap();
    bet.status = BetStatus::Won;
    bet.amount = 9_999;
    tx.upsert_bet(&bet).await.unwrap();
    tx.commit().await.unwrap();

    let stored = db.ledger.find_bets_for_event(event.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].amount, 40);
    assert_eq!(stored[0].status, BetStatus::Won);
    assert_eq!(stored[0].locked_multiplier, dec("2.25"));
    assert_eq!(stored[0].placement_key.as_deref(), Some("k"));
    assert_eq!(db.ledger.total_wagered_on_option(option.id).await.unwrap(), 40);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_claim_event_fails_fast_when_locked(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    db.cleanup().await;
    let event = db.create_event().await;

    let mut holder = db.ledger.begin().await.unwrap();
    holder.get_event(event.id).await.unwrap();

    let mut contender = db.ledger.begin().await.unwrap();
    let err = contender.claim_event(event.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::Contended(_)));
    drop(contender);

    let engine = WagerEngine::new(Arc::new(db.ledger.clone()), StakeCalculator::default());
    let err = engine.settle(event.id, &[]).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    drop(holder);
    engine.settle(event.id, &[]).await.unwrap();
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_placements_share_the_event_lock(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    db.cleanup().await;
    let event = db.create_event().await;
    let option = db.create_option(event.id, "offer").await;
    let user = db.create_user(500).await;

    // An open placement holds the event row
    let mut holder = db.ledger.begin().await.unwrap();
    holder.get_event(event.id).await.unwrap();

    let engine = WagerEngine::new(Arc::new(db.ledger.clone()), StakeCalculator::default());
    let wagers = [wager(&event, &option, BetSide::For, 100)];
    let placement = engine.place_bets(user.id, &wagers, None);
    let receipt = tokio::time::timeout(Duration::from_secs(5), placement)
        .await
        .expect("placement should not wait on another placement")
        .unwrap();
    assert_eq!(receipt.new_balance, 400);

    // Settlement still cannot take the row while a placement holds it
    let err = engine.settle(event.id, &[option.id]).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    assert!(err.is_retryable());

    drop(holder);
    engine.settle(event.id, &[option.id]).await.unwrap();
    assert_eq!(db.balance(user.id).await, 600);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_publish_ignores_older_versions(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    db.cleanup().await;
    let event = db.create_event().await;
    let option = db.create_option(event.id, "offer").await;

    db.ledger
        .publish_multipliers(option.id, MultiplierPair::new(dec("1.80"), dec("2.20")), 3)
        .await
        .unwrap();
    db.ledger
        .publish_multipliers(option.id, MultiplierPair::neutral(dec("5.00")), 2)
        .await
        .unwrap();

    let stored = db.ledger.get_option(option.id).await.unwrap().unwrap();
    assert_eq!(stored.multiplier_version, 3);
    assert_eq!(stored.multipliers, MultiplierPair::new(dec("1.80"), dec("2.20")));
    assert_eq!(db.ledger.active_option_ids().await.unwrap(), vec![option.id]);
}

// ============================================================================
// Engine over Postgres
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_place_settle_resettle_flow(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    db.cleanup().await;
    let user = db.create_user(1000).await;
    let event = db.create_event().await;
    let option = db.create_option(event.id, "offer").await;
    db.ledger
        .publish_multipliers(option.id, MultiplierPair::new(dec("1.50"), dec("2.50")), 1)
        .await
        .unwrap();

    let engine = WagerEngine::new(Arc::new(db.ledger.clone()), StakeCalculator::default());
    let item = WagerItem {
        event_id: event.id,
        option_id: option.id,
        side: BetSide::For,
        amount: 200,
    };

    let receipt = engine.place_bets(user.id, &[item.clone()], Some("once")).await.unwrap();
    assert_eq!(receipt.bets[0].locked_multiplier, dec("1.50"));
    let replay = engine.place_bets(user.id, &[item], Some("once")).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(db.balance(user.id).await, 800);

    engine.settle(event.id, &[option.id]).await.unwrap();
    assert_eq!(db.balance(user.id).await, 1100);

    engine.resettle(event.id, &[]).await.unwrap();
    assert_eq!(db.balance(user.id).await, 800);

    let bets = db.ledger.find_bets_for_event(event.id).await.unwrap();
    assert_eq!(bets[0].status, BetStatus::Lost);
    assert!(db.ledger.active_option_ids().await.unwrap().is_empty());
}
