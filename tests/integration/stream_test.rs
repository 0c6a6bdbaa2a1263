//! Update loop scenarios against a bootstrapped catalog

use crate::support::{key, price, RecordingSink, ScriptedSession, StaticSource};
use pyth_stream::bootstrap::{load_catalog, SubscriptionPlan};
use pyth_stream::broadcast::BroadcastMessage;
use pyth_stream::config::AccountSelection;
use pyth_stream::stream::{StreamError, UpdateLoop, UpdateLoopConfig};
use pyth_stream::watch::{Update, WatchSession};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn subscribed(updates: Vec<Update>, token: &CancellationToken) -> (ScriptedSession, pyth_stream::oracle::Catalog) {
    let source = StaticSource::single_product();
    let catalog = load_catalog(&source, None).await.unwrap();
    let plan = SubscriptionPlan::build(&source, &catalog, None, AccountSelection::All)
        .await
        .unwrap();

    let mut session = ScriptedSession::new(updates).shutdown_when_drained(token.clone());
    session.connect().await.unwrap();
    plan.apply(&mut session).await.unwrap();
    (session, catalog)
}

fn symbols_prices_slots(messages: &[BroadcastMessage]) -> Vec<(String, f64, u64)> {
    messages
        .iter()
        .map(|m| match m {
            BroadcastMessage::Price {
                symbol, price, slot, ..
            } => (symbol.clone(), *price, *slot),
            other => panic!("unexpected {other:?}"),
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_updates_forwarded_in_order_with_symbol() {
    let token = CancellationToken::new();
    let (mut session, mut catalog) = subscribed(
        vec![
            Update::Price(price(11, 1, 100, 10)),
            Update::Price(price(12, 1, 200, 11)),
            Update::Price(price(11, 1, 101, 12)),
        ],
        &token,
    )
    .await;
    let sink = Arc::new(RecordingSink::default());
    let update_loop = UpdateLoop::new(UpdateLoopConfig::default(), token).with_sink(sink.clone());

    let stats = update_loop.run(&mut session, &mut catalog).await.unwrap();

    assert_eq!(stats.forwarded, 3);
    assert_eq!(
        symbols_prices_slots(&sink.messages()),
        vec![
            ("X".to_string(), 100.0, 10),
            ("X".to_string(), 200.0, 11),
            ("X".to_string(), 101.0, 12),
        ]
    );
    assert_eq!(catalog.price(&key(11)).unwrap().last_slot, 12);
    assert_eq!(catalog.price(&key(12)).unwrap().last_slot, 11);
}

#[tokio::test(start_paused = true)]
async fn test_sink_disconnect_mid_stream() {
    let token = CancellationToken::new();
    let (mut session, mut catalog) = subscribed(
        vec![
            Update::Price(price(11, 1, 100, 10)),
            Update::Price(price(12, 1, 200, 11)),
            Update::Price(price(11, 1, 101, 12)),
            Update::Price(price(12, 1, 201, 13)),
        ],
        &token,
    )
    .await;
    let sink = Arc::new(RecordingSink::disconnecting_after(2));
    let update_loop = UpdateLoop::new(UpdateLoopConfig::default(), token).with_sink(sink.clone());

    let stats = update_loop.run(&mut session, &mut catalog).await.unwrap();

    assert_eq!(stats.routed, 4);
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.forward_failures, 2);
    assert_eq!(sink.messages().len(), 2);
    assert_eq!(catalog.price(&key(11)).unwrap().last_slot, 12);
    assert_eq!(catalog.price(&key(12)).unwrap().last_slot, 13);
}

#[tokio::test(start_paused = true)]
async fn test_slots_never_decrease() {
    let token = CancellationToken::new();
    let (mut session, mut catalog) = subscribed(
        vec![
            Update::Price(price(11, 1, 100, 10)),
            Update::Price(price(11, 1, 90, 8)),
            Update::Price(price(11, 1, 110, 10)),
        ],
        &token,
    )
    .await;
    let update_loop = UpdateLoop::new(UpdateLoopConfig::default(), token);

    let stats = update_loop.run(&mut session, &mut catalog).await.unwrap();

    assert_eq!(stats.stale, 1);
    let stored = catalog.price(&key(11)).unwrap();
    assert_eq!(stored.last_slot, 10);
    assert_eq!(stored.aggregate_price, rust_decimal::Decimal::from(110));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_update_aborts_loop() {
    let token = CancellationToken::new();
    let (mut session, mut catalog) = subscribed(
        vec![
            Update::Price(price(11, 1, 100, 10)),
            Update::Unknown {
                key: None,
                reason: "unexpected notification".to_string(),
            },
        ],
        &token,
    )
    .await;
    let sink = Arc::new(RecordingSink::default());
    let update_loop = UpdateLoop::new(UpdateLoopConfig::default(), token).with_sink(sink.clone());

    let err = update_loop.run(&mut session, &mut catalog).await.unwrap_err();
    assert!(matches!(err, StreamError::ProtocolViolation { key: None, .. }));
    assert_eq!(sink.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_counted_not_forwarded() {
    let token = CancellationToken::new();
    let (mut session, mut catalog) = subscribed(
        vec![Update::Discovery(BTreeSet::from([key(40)]))],
        &token,
    )
    .await;
    let sink = Arc::new(RecordingSink::default());
    let update_loop = UpdateLoop::new(UpdateLoopConfig::default(), token).with_sink(sink.clone());

    let stats = update_loop.run(&mut session, &mut catalog).await.unwrap();
    assert_eq!(stats.discovered, 1);
    assert!(sink.messages().is_empty());
}
