//! End-to-end lifecycle scenarios against the stub gateway.
//!
//! These drive the real stack (manager, lifecycle units, dispatcher,
//! command journal, in-memory store) with snapshots published on the
//! event bus, and assert on the commands the gateway actually received.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use tokio::time::{sleep, Duration};

use vigil_domain::{
    CandidateEntry, EngineConfig, EntryDraft, EntrySnapshot, ExitReason, LadderMode,
    MarketSnapshot, Price, Quantity, Reading, Side, Symbol,
};
use vigil_engine::{Engine, ReentryBlock};
use vigil_exec::{AmendAction, CommandJournal, Dispatcher, StubGateway};
use vigil_store::{MemoryStore, Store};
use vigil_testkit::SnapshotBuilder;
use vigild::{DaemonEvent, EventBus, GateDenied, LifecycleManager, RecordingNotifier};

struct Harness {
    manager: Arc<LifecycleManager<StubGateway>>,
    bus: Arc<EventBus>,
    gateway: Arc<StubGateway>,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

fn fast_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.ladder.mode = LadderMode::RiskMultiples {
        mults: vec![dec!(1.0), dec!(2.0), dec!(3.0)],
    };
    cfg.ladder.cooldown_secs = 0;
    cfg.ratchet.stop_cooldown_secs = 0;
    cfg.ratchet.post_tp1_delay_bars = 0;
    cfg.reentry.cooldown_secs = 0;
    cfg.amend_backoff_ms = 1;
    cfg
}

fn harness() -> Harness {
    harness_with(fast_config())
}

fn harness_with(cfg: EngineConfig) -> Harness {
    let gateway = Arc::new(StubGateway::new());
    let store = Arc::new(MemoryStore::new());
    let journal = Arc::new(CommandJournal::new());
    let dispatcher = Arc::new(Dispatcher::new(
        gateway.clone(),
        journal,
        cfg.amend_retries,
        cfg.amend_backoff_ms,
    ));
    let bus = Arc::new(EventBus::new(1000));
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(cfg).unwrap();
    let manager = Arc::new(LifecycleManager::new(
        engine,
        store.clone(),
        dispatcher,
        bus.clone(),
        notifier.clone(),
    ));

    Harness { manager, bus, gateway, store, notifier }
}

fn draft() -> EntryDraft {
    EntryDraft {
        symbol: Symbol::from_pair("SOLUSDT").unwrap(),
        side: Side::Long,
        price: Price::new(dec!(200)).unwrap(),
        quantity: Quantity::new(dec!(10)).unwrap(),
        initial_stop: Price::new(dec!(199)).unwrap(),
        entry: EntrySnapshot {
            side: Side::Long,
            trend_strength: dec!(27.0),
            volatility_pct: dec!(0.0045),
            on_trend_side: true,
            structure_formed: true,
            entered_at: Utc::now(),
        },
    }
}

fn snap(price: rust_decimal::Decimal, offset_secs: i64) -> MarketSnapshot {
    SnapshotBuilder::new("SOLUSDT", dec!(200))
        .price(price)
        .at(Utc::now() + ChronoDuration::seconds(offset_secs))
        .build()
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..500 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timeout waiting for {what}");
}

/// Wait until the registry holds no open positions (a close completed).
async fn wait_until_released(store: &Arc<MemoryStore>, what: &str) {
    for _ in 0..500 {
        if store.positions().find_open().await.unwrap().is_empty() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timeout waiting for {what}");
}

#[tokio::test]
async fn first_snapshot_commits_the_initial_ladder() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    h.bus.send(DaemonEvent::Snapshot(snap(dec!(200.2), 1)));

    let gateway = h.gateway.clone();
    wait_for("initial ladder amendment", move || {
        !gateway.applied_for(position.id).is_empty()
    })
    .await;

    let applied = h.gateway.applied_for(position.id);
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].sequence, 1);
    match &applied[0].action {
        AmendAction::SetTargets { targets } => {
            let values: Vec<_> = targets.iter().map(|t| t.as_decimal()).collect();
            assert_eq!(values, vec![dec!(201), dec!(202), dec!(203)]);
        }
        other => panic!("expected set_targets, got {other:?}"),
    }

    // Committed state persisted
    let saved = h.store.positions().find_by_id(position.id).await.unwrap().unwrap();
    assert_eq!(saved.targets.len(), 3);
}

#[tokio::test]
async fn first_target_commits_breakeven_stop() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    h.bus.send(DaemonEvent::Snapshot(snap(dec!(200.2), 1)));
    h.bus.send(DaemonEvent::Snapshot(snap(dec!(201), 2)));

    let gateway = h.gateway.clone();
    wait_for("breakeven stop amendment", move || {
        gateway
            .applied_for(position.id)
            .iter()
            .any(|a| matches!(&a.action, AmendAction::SetStop { stop } if stop.as_decimal() == dec!(200.2)))
    })
    .await;

    let saved = h.store.positions().find_by_id(position.id).await.unwrap().unwrap();
    assert_eq!(saved.targets_hit, 1);
    assert_eq!(saved.stop.as_decimal(), dec!(200.2));
}

#[tokio::test]
async fn replayed_snapshot_produces_zero_additional_commands() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    let snapshot = snap(dec!(200.2), 1);
    h.bus.send(DaemonEvent::Snapshot(snapshot.clone()));

    let gateway = h.gateway.clone();
    wait_for("initial ladder amendment", move || {
        !gateway.applied_for(position.id).is_empty()
    })
    .await;
    let before = h.gateway.applied_for(position.id).len();

    // The identical snapshot again, twice for good measure
    h.bus.send(DaemonEvent::Snapshot(snapshot.clone()));
    h.bus.send(DaemonEvent::Snapshot(snapshot));
    sleep(Duration::from_millis(200)).await;

    assert_eq!(h.gateway.applied_for(position.id).len(), before);
}

#[tokio::test]
async fn second_fill_on_same_key_is_rejected() {
    let h = harness();
    h.manager.on_fill(draft()).await.unwrap();

    let result = h.manager.on_fill(draft()).await;
    assert!(result.is_err(), "one open position per (instrument, side)");

    // The opposite side is its own key
    let mut short = draft();
    short.side = Side::Short;
    short.entry.side = Side::Short;
    short.initial_stop = Price::new(dec!(201)).unwrap();
    h.manager.on_fill(short).await.unwrap();
}

#[tokio::test]
async fn hard_invalidation_closes_and_gates_reentry() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    // While open, the gate denies outright
    let candidate = CandidateEntry {
        symbol: Symbol::from_pair("SOLUSDT").unwrap(),
        side: Side::Long,
        price: Price::new(dec!(205)).unwrap(),
        fresh_structure: true,
        extension_pct: dec!(0),
        momentum: Reading::ready(dec!(0.8)),
    };
    assert_eq!(
        h.manager.gate(&candidate, None).await.unwrap(),
        Err(GateDenied::PositionOpen)
    );

    // Hard invalidation: deep metric failure, wrong-side closes confirmed
    let hard = SnapshotBuilder::new("SOLUSDT", dec!(200))
        .price(dec!(199.6))
        .trend_strength(dec!(21.0))
        .volatility_pct(dec!(0.0030))
        .trend_ref(dec!(201))
        .adverse_closes(Side::Long, 3)
        .at(Utc::now() + ChronoDuration::seconds(1))
        .build();
    h.bus.send(DaemonEvent::Snapshot(hard));

    wait_until_released(&h.store, "guard-exit close").await;

    // Close command sent, lock written
    let applied = h.gateway.applied_for(position.id);
    assert!(applied.iter().any(|a| matches!(a.action, AmendAction::Close)));

    let locks = h.store.reentry_locks().all().await.unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].exit_reason, ExitReason::GuardExit(vigil_domain::GuardExitReason::HardInvalidation));

    // Inside the distance band: rejected despite the fresh trigger
    let near = CandidateEntry { price: Price::new(dec!(199.8)).unwrap(), ..candidate.clone() };
    assert!(matches!(
        h.manager.gate(&near, None).await.unwrap(),
        Err(GateDenied::Reentry(ReentryBlock::TooClose { .. }))
    ));

    // Outside the band with a fresh structural trigger: accepted
    let far = CandidateEntry { price: Price::new(dec!(201)).unwrap(), ..candidate };
    assert_eq!(h.manager.gate(&far, None).await.unwrap(), Ok(()));
}

#[tokio::test]
async fn runner_to_chop_flip_flattens_the_remainder() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    // RUNNER conditions seed the ladder and carry the regime up
    let runner = SnapshotBuilder::new("SOLUSDT", dec!(200))
        .price(dec!(200.3))
        .trend_strength(dec!(28.0))
        .volatility_pct(dec!(0.0050))
        .at(Utc::now() + ChronoDuration::seconds(1))
        .build();
    h.bus.send(DaemonEvent::Snapshot(runner));

    // First target hit while RUNNER
    let tp1 = SnapshotBuilder::new("SOLUSDT", dec!(200))
        .price(dec!(201))
        .trend_strength(dec!(28.0))
        .volatility_pct(dec!(0.0050))
        .at(Utc::now() + ChronoDuration::seconds(2))
        .build();
    h.bus.send(DaemonEvent::Snapshot(tp1));

    // Collapse below both down bands: flip and flatten
    let chop = SnapshotBuilder::new("SOLUSDT", dec!(200))
        .price(dec!(201.2))
        .trend_strength(dec!(22.0))
        .volatility_pct(dec!(0.0030))
        .at(Utc::now() + ChronoDuration::seconds(3))
        .build();
    h.bus.send(DaemonEvent::Snapshot(chop));

    wait_until_released(&h.store, "regime-flip close").await;

    let locks = h.store.reentry_locks().all().await.unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].exit_reason, ExitReason::RegimeFlip);

    let applied = h.gateway.applied_for(position.id);
    assert!(applied.iter().any(|a| matches!(a.action, AmendAction::Close)));

    // The exit summary carries structured data only
    let messages = h.notifier.messages();
    assert!(messages.iter().any(|m| matches!(
        m,
        vigil_domain::NotificationMessage::ExitSummary { reason, .. } if reason == "regime_flip"
    )));
}

#[tokio::test]
async fn gateway_flat_report_halts_without_close_command() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    // Venue reports zero size before the next tick
    h.gateway.set_position_size("SOLUSDT", Side::Long, Quantity::zero());
    h.bus.send(DaemonEvent::Snapshot(snap(dec!(200.4), 1)));

    wait_until_released(&h.store, "externally-flat close").await;

    let locks = h.store.reentry_locks().all().await.unwrap();
    assert_eq!(locks[0].exit_reason, ExitReason::ExternallyFlat);

    // Already flat: no Close command was issued
    let applied = h.gateway.applied_for(position.id);
    assert!(!applied.iter().any(|a| matches!(a.action, AmendAction::Close)));
    // In-flight work cancelled best-effort
    assert!(h.gateway.cancelled().contains(&position.id));
}

#[tokio::test]
async fn size_mismatch_runs_forced_close_audit() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    // Venue reports a different non-zero size than the unit manages
    h.gateway
        .set_position_size("SOLUSDT", Side::Long, Quantity::new(dec!(4)).unwrap());
    h.bus.send(DaemonEvent::Snapshot(snap(dec!(200.4), 1)));

    wait_until_released(&h.store, "desync close-audit").await;

    // The audit trail survives even though the unit halted
    let records = h
        .store
        .exit_records()
        .find_by_position(position.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(h.gateway.cancelled().contains(&position.id));
}

#[tokio::test]
async fn amendment_rejections_leave_committed_state_unchanged() {
    let h = harness();
    let position = h.manager.on_fill(draft()).await.unwrap();

    // Every attempt for the first command (and its retries) is rejected
    h.gateway.reject_next(4, "venue throttling");
    h.bus.send(DaemonEvent::Snapshot(snap(dec!(200.2), 1)));
    sleep(Duration::from_millis(300)).await;

    // No amendment landed; committed ladder unchanged (empty)
    assert!(h.gateway.applied_for(position.id).is_empty());
    let saved = h.store.positions().find_by_id(position.id).await.unwrap().unwrap();
    assert!(saved.targets.is_empty());

    // Next tick retries with a fresh sequence and succeeds
    h.bus.send(DaemonEvent::Snapshot(snap(dec!(200.3), 2)));
    let gateway = h.gateway.clone();
    wait_for("ladder after recovery", move || {
        !gateway.applied_for(position.id).is_empty()
    })
    .await;
}

