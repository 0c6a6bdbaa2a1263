//! Relay feeding a live WebSocket listener

use crate::support::{key, price, resolver, ScriptedSession, StaticSource};
use futures_util::StreamExt;
use pyth_stream::broadcast::{BroadcastMessage, ListenerServer, ListenerSlot};
use pyth_stream::config::{AccountSelection, SubscriptionModeRequest};
use pyth_stream::relay::{Relay, RelayOutcome, RelaySettings};
use pyth_stream::stream::UpdateLoopConfig;
use pyth_stream::watch::Update;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

async fn next_message<S>(ws: &mut S) -> BroadcastMessage
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("listener stream ended")
            .expect("listener stream failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("valid broadcast message");
        }
    }
}

#[tokio::test]
async fn test_listener_receives_greeting_then_prices() {
    let shutdown = CancellationToken::new();
    let slot = Arc::new(ListenerSlot::new());
    let server = ListenerServer::bind("127.0.0.1:0", slot.clone(), 16)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    assert_eq!(next_message(&mut ws).await, BroadcastMessage::welcome());
    while !slot.is_attached() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let relay_token = CancellationToken::new();
    let relay = Relay::new(
        RelaySettings {
            network: "devnet".to_string(),
            mode: SubscriptionModeRequest::Accounts,
            selection: AccountSelection::All,
            max_products: None,
            update_loop: UpdateLoopConfig {
                poll_interval: Duration::from_millis(20),
            },
        },
        relay_token.clone(),
    )
    .with_sink(slot.clone());
    let mut session = ScriptedSession::new(vec![
        Update::Price(price(11, 1, 100, 10)),
        Update::Price(price(12, 1, 200, 11)),
    ])
    .shutdown_when_drained(relay_token);

    let outcome = relay
        .run(
            &resolver(Some(key(50)), None),
            |_| StaticSource::single_product(),
            &mut session,
        )
        .await
        .unwrap();
    let RelayOutcome::Finished(report) = outcome else {
        panic!("expected a finished run");
    };
    assert_eq!(report.stats.forwarded, 2);

    for expected in [100.0, 200.0] {
        match next_message(&mut ws).await {
            BroadcastMessage::Price {
                symbol,
                price,
                status,
                price_type,
                ..
            } => {
                assert_eq!(symbol, "X");
                assert_eq!(price, expected);
                assert_eq!(status, "trading");
                assert_eq!(price_type, "price");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    shutdown.cancel();
    server_task.await.unwrap().unwrap();
}
