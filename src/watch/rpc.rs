//! Watch session over Solana JSON-RPC pub/sub
//!
//! Subscribe and unsubscribe requests are queued as control frames and
//! flushed to the socket; confirmations and notifications are consumed by
//! `next_update`. Every await point is a cancel-safe channel operation and
//! decoded updates are queued on the session, so dropping a pending
//! `next_update` never loses one.

use super::{SessionState, SubscriptionTable, Update, WatchError, WatchSession};
use crate::jsonrpc::{account_config, request, KeyedAccount, RpcErrorObject, UiAccount, WithContext};
use crate::oracle::layout::{self, AccountType};
use crate::oracle::{AccountKey, DEFAULT_COMMITMENT};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default time allowed for the first connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Target {
    Account(AccountKey),
    Program(AccountKey),
}

impl Target {
    fn key(&self) -> AccountKey {
        match self {
            Target::Account(k) | Target::Program(k) => *k,
        }
    }

    fn subscribe_method(&self) -> &'static str {
        match self {
            Target::Account(_) => "accountSubscribe",
            Target::Program(_) => "programSubscribe",
        }
    }

    fn unsubscribe_method(&self) -> &'static str {
        match self {
            Target::Account(_) => "accountUnsubscribe",
            Target::Program(_) => "programUnsubscribe",
        }
    }
}

/// Any inbound frame: a response to one of our requests or a notification
#[derive(Debug, Deserialize)]
struct Frame {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcErrorObject>,
    method: Option<String>,
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: u64,
    result: Value,
}

/// [`WatchSession`] backed by the reconnecting [`WsClient`]
pub struct RpcWatchSession {
    config: WsConfig,
    commitment: String,
    connect_timeout: Duration,
    table: SubscriptionTable,
    inbound: Option<mpsc::Receiver<WsMessage>>,
    outbound: Option<mpsc::Sender<String>>,
    /// Control frames not yet handed to the socket task
    outbox: VecDeque<String>,
    /// Decoded updates not yet returned
    ready: VecDeque<Update>,
    next_request_id: u64,
    /// Subscribe request id → target awaiting confirmation
    pending: HashMap<u64, Target>,
    /// Server subscription id → target
    active: HashMap<u64, Target>,
    subscriptions: HashMap<Target, u64>,
}

impl RpcWatchSession {
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            commitment: DEFAULT_COMMITMENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            table: SubscriptionTable::new(),
            inbound: None,
            outbound: None,
            outbox: VecDeque::new(),
            ready: VecDeque::new(),
            next_request_id: 1,
            pending: HashMap::new(),
            active: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Number of subscriptions confirmed by the server
    pub fn confirmed_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    fn request_subscription(&mut self, target: Target) {
        let id = self.take_request_id();
        self.pending.insert(id, target);
        let frame = request(
            id,
            target.subscribe_method(),
            json!([target.key().to_string(), account_config(&self.commitment)]),
        );
        self.outbox.push_back(frame.to_string());
    }

    fn request_unsubscribe(&mut self, method: &str, subscription: u64) {
        let id = self.take_request_id();
        self.outbox
            .push_back(request(id, method, json!([subscription])).to_string());
    }

    fn release(&mut self, target: Target) {
        // Unconfirmed targets are released when their confirmation arrives
        if let Some(subscription) = self.subscriptions.remove(&target) {
            self.active.remove(&subscription);
            self.request_unsubscribe(target.unsubscribe_method(), subscription);
        }
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn wanted(&self, target: &Target) -> bool {
        match target {
            Target::Account(key) => self.table.has_account(key),
            Target::Program(key) => self.table.program() == Some(*key),
        }
    }

    /// Hand queued control frames to the socket task
    ///
    /// The socket task stops reading control frames while the inbound
    /// channel is full, so inbound frames are drained into `ready` while
    /// waiting for capacity.
    async fn flush(&mut self) -> Result<(), WatchError> {
        while !self.outbox.is_empty() {
            let (Some(outbound), Some(inbound)) = (self.outbound.as_ref(), self.inbound.as_mut())
            else {
                return Err(WatchError::Connection("transport not connected".into()));
            };
            let received = tokio::select! {
                biased;
                permit = outbound.reserve() => {
                    let permit =
                        permit.map_err(|_| WatchError::Connection("transport closed".into()))?;
                    if let Some(frame) = self.outbox.pop_front() {
                        permit.send(frame);
                    }
                    None
                }
                message = inbound.recv() => Some(message),
            };
            if let Some(message) = received {
                self.handle_message(message)?;
            }
        }
        Ok(())
    }

    fn handle_message(&mut self, message: Option<WsMessage>) -> Result<(), WatchError> {
        match message {
            Some(WsMessage::Text(text)) => self.handle_frame(&text),
            Some(WsMessage::Connected) => {
                self.resubscribe();
                Ok(())
            }
            Some(WsMessage::Reconnecting { attempt }) => {
                tracing::warn!(attempt, "Watch transport lost, reconnecting");
                self.forget_server_state();
                Ok(())
            }
            Some(WsMessage::Binary(_)) => Ok(()),
            Some(WsMessage::Disconnected) | None => {
                Err(WatchError::Connection("transport closed".into()))
            }
        }
    }

    /// Server-side subscriptions die with the socket
    fn forget_server_state(&mut self) {
        self.pending.clear();
        self.active.clear();
        self.subscriptions.clear();
        self.outbox.clear();
    }

    fn resubscribe(&mut self) {
        let mut targets: Vec<Target> = self.table.accounts().copied().map(Target::Account).collect();
        targets.extend(self.table.program().map(Target::Program));
        tracing::info!(count = targets.len(), "Restoring subscriptions");
        for target in targets {
            if !self.subscriptions.contains_key(&target) {
                self.request_subscription(target);
            }
        }
    }

    fn handle_frame(&mut self, text: &str) -> Result<(), WatchError> {
        let frame: Frame = serde_json::from_str(text)
            .map_err(|e| WatchError::Protocol(format!("malformed frame: {e}")))?;

        if let Some(method) = frame.method.as_deref() {
            let params = frame
                .params
                .ok_or_else(|| WatchError::Protocol(format!("{method} without params")))?;
            return self.handle_notification(method, params);
        }

        if let Some(id) = frame.id {
            self.handle_response(id, frame.result, frame.error)?;
        }
        Ok(())
    }

    fn handle_response(
        &mut self,
        id: u64,
        result: Option<Value>,
        error: Option<RpcErrorObject>,
    ) -> Result<(), WatchError> {
        // Unsubscribe acknowledgements are not tracked
        let Some(target) = self.pending.remove(&id) else {
            return Ok(());
        };

        if let Some(error) = error {
            return Err(WatchError::Protocol(format!(
                "{} rejected for {}: {}",
                target.subscribe_method(),
                target.key(),
                error
            )));
        }

        let subscription = result
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or_else(|| WatchError::Protocol("subscription id missing".into()))?;

        if !self.wanted(&target) || self.subscriptions.contains_key(&target) {
            self.request_unsubscribe(target.unsubscribe_method(), subscription);
            return Ok(());
        }

        tracing::debug!(key = %target.key(), subscription, "Subscription confirmed");
        self.active.insert(subscription, target);
        self.subscriptions.insert(target, subscription);
        Ok(())
    }

    fn handle_notification(
        &mut self,
        method: &str,
        params: NotificationParams,
    ) -> Result<(), WatchError> {
        let Some(target) = self.active.get(&params.subscription).copied() else {
            tracing::debug!(
                subscription = params.subscription,
                "Notification for inactive subscription"
            );
            return Ok(());
        };

        match (method, target) {
            ("accountNotification", Target::Account(key)) => {
                let payload: WithContext<UiAccount> = serde_json::from_value(params.result)
                    .map_err(|e| WatchError::Protocol(format!("bad account notification: {e}")))?;
                let update = match payload.value.decode_data() {
                    Ok(data) => price_update(key, &data),
                    Err(e) => Update::Unknown {
                        key: Some(key),
                        reason: e.to_string(),
                    },
                };
                self.ready.push_back(update);
            }
            ("programNotification", Target::Program(_)) => {
                let payload: WithContext<KeyedAccount> = serde_json::from_value(params.result)
                    .map_err(|e| WatchError::Protocol(format!("bad program notification: {e}")))?;
                let key: AccountKey = payload
                    .value
                    .pubkey
                    .parse()
                    .map_err(|e| WatchError::Protocol(format!("bad account key: {e}")))?;

                if self.table.track(key) {
                    tracing::debug!(%key, tracked = self.table.tracked_count(), "Account discovered");
                    self.ready.push_back(Update::Discovery(BTreeSet::from([key])));
                }

                let data = payload
                    .value
                    .account
                    .decode_data()
                    .map_err(|e| WatchError::Protocol(e.to_string()))?;
                // Product and mapping refreshes are not price updates
                if let Ok(AccountType::Price) = layout::account_type(&data) {
                    self.ready.push_back(price_update(key, &data));
                }
            }
            (method, _) => {
                tracing::debug!(method, "Ignoring notification");
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn with_channels(inbound: mpsc::Receiver<WsMessage>, outbound: mpsc::Sender<String>) -> Self {
        let mut session = Self::new(WsConfig::new("ws://test"));
        session.inbound = Some(inbound);
        session.outbound = Some(outbound);
        session.table.connected().expect("fresh session");
        session
    }
}

fn price_update(key: AccountKey, data: &[u8]) -> Update {
    match layout::decode_price(key, data) {
        Ok(decoded) => Update::Price(decoded.account),
        Err(e) => Update::Unknown {
            key: Some(key),
            reason: e.to_string(),
        },
    }
}

#[async_trait]
impl WatchSession for RpcWatchSession {
    fn state(&self) -> SessionState {
        self.table.state()
    }

    async fn connect(&mut self) -> Result<(), WatchError> {
        let state = self.table.state();
        if state != SessionState::Disconnected {
            return Err(WatchError::InvalidState {
                operation: "connect",
                state,
            });
        }

        let (mut inbound, outbound) = WsClient::new(self.config.clone()).connect();
        match tokio::time::timeout(self.connect_timeout, inbound.recv()).await {
            Ok(Some(WsMessage::Connected)) => {}
            Ok(Some(_)) | Ok(None) => {
                return Err(WatchError::Connection(format!(
                    "{} unreachable",
                    self.config.url
                )));
            }
            Err(_) => {
                return Err(WatchError::Connection(format!(
                    "{} did not answer within {:?}",
                    self.config.url, self.connect_timeout
                )));
            }
        }

        self.inbound = Some(inbound);
        self.outbound = Some(outbound);
        self.table.connected()?;
        tracing::info!(url = %self.config.url, "Watch session connected");
        Ok(())
    }

    async fn subscribe(&mut self, account: AccountKey) -> Result<(), WatchError> {
        if self.table.add_account(account)? {
            self.request_subscription(Target::Account(account));
        }
        self.flush().await
    }

    async fn unsubscribe(&mut self, account: AccountKey) -> Result<(), WatchError> {
        if self.table.remove_account(&account)? {
            self.release(Target::Account(account));
        }
        self.flush().await
    }

    async fn program_subscribe(
        &mut self,
        program: AccountKey,
        known: BTreeSet<AccountKey>,
    ) -> Result<(), WatchError> {
        if self.table.set_program(program, known)? {
            self.request_subscription(Target::Program(program));
        }
        self.flush().await
    }

    async fn program_unsubscribe(&mut self, program: AccountKey) -> Result<(), WatchError> {
        if self.table.clear_program(&program)? {
            self.release(Target::Program(program));
        }
        self.flush().await
    }

    async fn next_update(&mut self) -> Result<Update, WatchError> {
        self.table.require_streaming()?;

        loop {
            if let Some(update) = self.ready.pop_front() {
                return Ok(update);
            }
            if !self.outbox.is_empty() {
                self.flush().await?;
                continue;
            }

            let Some(inbound) = self.inbound.as_mut() else {
                return Err(WatchError::Connection("transport not connected".into()));
            };
            let message = inbound.recv().await;
            self.handle_message(message)?;
        }
    }

    async fn disconnect(&mut self) -> Result<(), WatchError> {
        if self.table.state() == SessionState::Closed {
            return Ok(());
        }
        let confirmed = self.confirmed_subscriptions();
        // Dropping the sender closes the socket
        self.outbound = None;
        self.inbound = None;
        self.forget_server_state();
        self.ready.clear();
        self.table.closed();
        tracing::info!(confirmed, "Watch session closed");
        Ok(())
    }
}
