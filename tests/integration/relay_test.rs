//! Relay bootstrap and teardown

use crate::support::{key, price, resolver, Call, RecordingSink, ScriptedSession, StaticSource};
use pyth_stream::config::{AccountSelection, SubscriptionModeRequest};
use pyth_stream::relay::{Relay, RelayError, RelayOutcome, RelaySettings};
use pyth_stream::stream::{StreamError, UpdateLoopConfig};
use pyth_stream::watch::{SubscriptionMode, Update, WatchError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn settings(mode: SubscriptionModeRequest) -> RelaySettings {
    RelaySettings {
        network: "devnet".to_string(),
        mode,
        selection: AccountSelection::All,
        max_products: None,
        update_loop: UpdateLoopConfig::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_mapping_key_subscribes_nothing() {
    let token = CancellationToken::new();
    let relay = Relay::new(settings(SubscriptionModeRequest::Program), token.clone());
    let mut session = ScriptedSession::new(vec![]).shutdown_when_drained(token);
    let mut opened = false;

    let outcome = relay
        .run(
            &resolver(None, Some(key(99))),
            |_| {
                opened = true;
                StaticSource::single_product()
            },
            &mut session,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, RelayOutcome::MissingMappingKey(_)));
    assert!(!opened);
    assert_eq!(session.subscribe_count(), 0);
    assert!(session.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_program_key_falls_back_to_accounts() {
    let token = CancellationToken::new();
    let relay = Relay::new(settings(SubscriptionModeRequest::Program), token.clone());
    let mut session = ScriptedSession::new(vec![]).shutdown_when_drained(token);

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
    assert_eq!(report.mode, SubscriptionMode::Accounts);
    assert_eq!(report.subscriptions, 2);
    assert_eq!(
        session.calls(),
        vec![
            Call::Connect,
            Call::Subscribe(key(11)),
            Call::Subscribe(key(12)),
            Call::Unsubscribe(key(11)),
            Call::Unsubscribe(key(12)),
            Call::Disconnect,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_program_mode_subscribes_once() {
    let token = CancellationToken::new();
    let relay = Relay::new(settings(SubscriptionModeRequest::Program), token.clone());
    let mut session = ScriptedSession::new(vec![Update::Price(price(11, 1, 5, 2))])
        .shutdown_when_drained(token);

    let outcome = relay
        .run(
            &resolver(Some(key(50)), Some(key(99))),
            |keys| {
                assert_eq!(keys.mapping, key(50));
                assert_eq!(keys.program, Some(key(99)));
                StaticSource::single_product()
            },
            &mut session,
        )
        .await
        .unwrap();

    let RelayOutcome::Finished(report) = outcome else {
        panic!("expected a finished run");
    };
    assert_eq!(report.mode, SubscriptionMode::Program);
    assert_eq!(report.stats.routed, 1);
    assert_eq!(
        session.calls(),
        vec![
            Call::Connect,
            Call::ProgramSubscribe(key(99), 3),
            Call::ProgramUnsubscribe(key(99)),
            Call::Disconnect,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_first_selection_subscribes_one_account() {
    let token = CancellationToken::new();
    let mut settings = settings(SubscriptionModeRequest::Accounts);
    settings.selection = AccountSelection::First;
    let relay = Relay::new(settings, token.clone());
    let mut session = ScriptedSession::new(vec![]).shutdown_when_drained(token);

    relay
        .run(
            &resolver(Some(key(50)), None),
            |_| StaticSource::single_product(),
            &mut session,
        )
        .await
        .unwrap();

    assert_eq!(session.subscribe_count(), 1);
    assert!(session.calls().contains(&Call::Subscribe(key(11))));
}

#[tokio::test(start_paused = true)]
async fn test_forwards_through_sink() {
    let token = CancellationToken::new();
    let sink = Arc::new(RecordingSink::default());
    let relay = Relay::new(settings(SubscriptionModeRequest::Accounts), token.clone())
        .with_sink(sink.clone());
    let mut session = ScriptedSession::new(vec![
        Update::Price(price(11, 1, 5, 2)),
        Update::Price(price(12, 1, 6, 3)),
    ])
    .shutdown_when_drained(token);

    relay
        .run(
            &resolver(Some(key(50)), None),
            |_| StaticSource::single_product(),
            &mut session,
        )
        .await
        .unwrap();

    assert_eq!(sink.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_after_protocol_violation() {
    let relay = Relay::new(
        settings(SubscriptionModeRequest::Accounts),
        CancellationToken::new(),
    );
    let mut session = ScriptedSession::new(vec![Update::Unknown {
        key: Some(key(11)),
        reason: "bad magic".to_string(),
    }]);

    let err = relay
        .run(
            &resolver(Some(key(50)), None),
            |_| StaticSource::single_product(),
            &mut session,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RelayError::Stream(StreamError::ProtocolViolation { .. })
    ));
    let calls = session.calls();
    assert_eq!(calls.last(), Some(&Call::Disconnect));
    assert!(calls.contains(&Call::Unsubscribe(key(11))));
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_is_fatal() {
    let relay = Relay::new(
        settings(SubscriptionModeRequest::Accounts),
        CancellationToken::new(),
    );
    let mut session = ScriptedSession::unreachable();

    let err = relay
        .run(
            &resolver(Some(key(50)), None),
            |_| StaticSource::single_product(),
            &mut session,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Watch(WatchError::Connection(_))));
    assert_eq!(session.subscribe_count(), 0);
    assert_eq!(session.calls(), vec![Call::Connect, Call::Disconnect]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_catalog_is_fatal() {
    let relay = Relay::new(
        settings(SubscriptionModeRequest::Accounts),
        CancellationToken::new(),
    );
    let mut session = ScriptedSession::new(vec![]);

    let err = relay
        .run(
            &resolver(Some(key(50)), None),
            |_| StaticSource::default(),
            &mut session,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Bootstrap(_)));
    assert!(session.calls().is_empty());
}
