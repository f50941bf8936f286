mod helpers;

use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wager_engine::models::*;
use wager_engine::services::{AuditLogEntry, AuditTrail};
use wager_engine::{StakeCalculator, StakeParams, WagerEngine};

/// End-to-end flow: place bets → recomputer publishes → later bets lock new multiplier → settle
#[tokio::test]
async fn test_recomputed_multiplier_reaches_new_bets() {
    let t = TestEngine::new();
    let calculator = StakeCalculator::new(StakeParams {
        sensitivity: dec("0.001"),
        easing: dec("1"),
        ..StakeParams::default()
    })
    .unwrap();
    let (engine, recomputer) = WagerEngine::new(Arc::new(t.ledger.clone()), calculator)
        .with_recomputer(16, Duration::from_secs(3600));
    let recomputer_handle = tokio::spawn(recomputer.start());

    let early = t.create_user(1000).await;
    let late = t.create_user(1000).await;
    let event = t.create_event().await;
    let option = t.create_option(event.id, "offer").await;

    let first = engine
        .place_bets(early.id, &[wager(&event, &option, BetSide::For, 500)], None)
        .await
        .unwrap();
    assert_eq!(first.bets[0].locked_multiplier, dec("2.00"));

    // The queued recompute lands asynchronously
    let mut published = None;
    for _ in 0..100 {
        if let Some(snapshot) = engine.board().snapshot(option.id).await {
            if snapshot.pair().for_multiplier == dec("1.50") {
                published = Some(snapshot);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let published = published.expect("Recomputer should publish the new pair");
    assert_eq!(published.pair().against_multiplier, dec("2.50"));

    let second = engine
        .place_bets(late.id, &[wager(&event, &option, BetSide::For, 100)], None)
        .await
        .unwrap();
    assert_eq!(second.bets[0].locked_multiplier, dec("1.50"));

    let report = engine.settle(event.id, &[option.id]).await.unwrap();
    assert_eq!(report.total_credited, 1000 + 150);
    assert_eq!(t.balance(early.id).await, 1500);
    assert_eq!(t.balance(late.id).await, 1050);

    recomputer_handle.abort();
}

#[tokio::test]
async fn test_audit_trail_records_lifecycle() {
    let dir = std::env::temp_dir().join(format!("wager_e2e_audit_{}", Uuid::new_v4()));
    let audit = Arc::new(AuditTrail::new(&dir).unwrap());

    let t = TestEngine::new();
    let engine = WagerEngine::new(Arc::new(t.ledger.clone()), StakeCalculator::default())
        .with_audit_trail(audit.clone());

    let user = t.create_user(1000).await;
    let event = t.create_event().await;
    let option = t.create_option(event.id, "offer").await;

    engine
        .place_bets(user.id, &[wager(&event, &option, BetSide::Against, 100)], None)
        .await
        .unwrap();
    engine.settle(event.id, &[]).await.unwrap();
    engine.resettle(event.id, &[option.id]).await.unwrap();

    let contents = std::fs::read_to_string(audit.path()).unwrap();
    let entries: Vec<AuditLogEntry> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let kinds: Vec<&str> = entries.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, ["bets_placed", "event_settled", "event_resettled"]);
    assert_eq!(entries[0].user_id, Some(user.id));
    assert_eq!(entries[1].details["total_credited"], 200);
    assert_eq!(entries[2].details["total_reverted"], 200);
    assert_eq!(entries[2].details["total_credited"], 0);
    assert_eq!(t.balance(user.id).await, 900);

    std::fs::remove_dir_all(dir).ok();
}
