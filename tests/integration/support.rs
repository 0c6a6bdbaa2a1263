//! Scripted doubles shared by the integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use pyth_stream::broadcast::{BroadcastMessage, BroadcastSink, SinkDeliveryError};
use pyth_stream::config::NetworkKeys;
use pyth_stream::oracle::{
    AccountKey, AccountSource, ConfigKeyResolver, PriceAccount, PriceStatus, PriceType, Product,
    SourceError,
};
use pyth_stream::watch::{SessionState, SubscriptionTable, Update, WatchError, WatchSession};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn key(b: u8) -> AccountKey {
    AccountKey::new([b; 32])
}

pub fn product(k: u8, symbol: &str) -> Product {
    Product {
        key: key(k),
        attrs: BTreeMap::from([
            ("symbol".to_string(), symbol.to_string()),
            ("asset_type".to_string(), "Crypto".to_string()),
        ]),
        first_price: None,
    }
}

pub fn price(k: u8, product: u8, value: i64, slot: u64) -> PriceAccount {
    PriceAccount {
        key: key(k),
        product_key: key(product),
        price_type: PriceType::Price,
        exponent: 0,
        aggregate_status: PriceStatus::Trading,
        aggregate_price: Decimal::from(value),
        aggregate_confidence: Decimal::ONE,
        last_slot: slot,
        valid_slot: slot,
    }
}

/// Resolver knowing the given keys for "devnet"
pub fn resolver(mapping: Option<AccountKey>, program: Option<AccountKey>) -> ConfigKeyResolver {
    ConfigKeyResolver::new(HashMap::from([(
        "devnet".to_string(),
        NetworkKeys { mapping, program },
    )]))
}

/// In-memory account source
#[derive(Default)]
pub struct StaticSource {
    pub products: Vec<(Product, Vec<PriceAccount>)>,
    pub program_accounts: BTreeSet<AccountKey>,
}

impl StaticSource {
    /// Product `X` (key 1) with prices P1 (key 11) and P2 (key 12)
    pub fn single_product() -> Self {
        Self {
            products: vec![(
                product(1, "X"),
                vec![price(11, 1, 0, 1), price(12, 1, 0, 1)],
            )],
            program_accounts: BTreeSet::from([key(1), key(11), key(12)]),
        }
    }
}

#[async_trait]
impl AccountSource for StaticSource {
    async fn refresh_all(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, SourceError> {
        Ok(self.products.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn list_prices(&self, product: &Product) -> Result<Vec<PriceAccount>, SourceError> {
        Ok(self
            .products
            .iter()
            .find(|(p, _)| p.key == product.key)
            .map(|(_, prices)| prices.clone())
            .unwrap_or_default())
    }

    async fn list_all_accounts(&self) -> Result<BTreeSet<AccountKey>, SourceError> {
        Ok(self.program_accounts.clone())
    }
}

/// Calls observed by [`ScriptedSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Subscribe(AccountKey),
    Unsubscribe(AccountKey),
    ProgramSubscribe(AccountKey, usize),
    ProgramUnsubscribe(AccountKey),
    Disconnect,
}

/// Watch session replaying a fixed script
///
/// Once the script is drained `next_update` stays pending, optionally
/// cancelling a shutdown token first.
pub struct ScriptedSession {
    table: SubscriptionTable,
    script: VecDeque<Result<Update, WatchError>>,
    calls: Arc<Mutex<Vec<Call>>>,
    on_drained: Option<CancellationToken>,
    refuse_connect: bool,
}

impl ScriptedSession {
    pub fn new(updates: Vec<Update>) -> Self {
        Self {
            table: SubscriptionTable::new(),
            script: updates.into_iter().map(Ok).collect(),
            calls: Arc::default(),
            on_drained: None,
            refuse_connect: false,
        }
    }

    pub fn shutdown_when_drained(mut self, token: CancellationToken) -> Self {
        self.on_drained = Some(token);
        self
    }

    pub fn unreachable() -> Self {
        Self {
            refuse_connect: true,
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Subscribe(_) | Call::ProgramSubscribe(..)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl WatchSession for ScriptedSession {
    fn state(&self) -> SessionState {
        self.table.state()
    }

    async fn connect(&mut self) -> Result<(), WatchError> {
        self.record(Call::Connect);
        if self.refuse_connect {
            return Err(WatchError::Connection("unreachable".to_string()));
        }
        self.table.connected()
    }

    async fn subscribe(&mut self, account: AccountKey) -> Result<(), WatchError> {
        self.table.add_account(account)?;
        self.record(Call::Subscribe(account));
        Ok(())
    }

    async fn unsubscribe(&mut self, account: AccountKey) -> Result<(), WatchError> {
        if self.table.remove_account(&account)? {
            self.record(Call::Unsubscribe(account));
        }
        Ok(())
    }

    async fn program_subscribe(
        &mut self,
        program: AccountKey,
        known: BTreeSet<AccountKey>,
    ) -> Result<(), WatchError> {
        let count = known.len();
        self.table.set_program(program, known)?;
        self.record(Call::ProgramSubscribe(program, count));
        Ok(())
    }

    async fn program_unsubscribe(&mut self, program: AccountKey) -> Result<(), WatchError> {
        if self.table.clear_program(&program)? {
            self.record(Call::ProgramUnsubscribe(program));
        }
        Ok(())
    }

    async fn next_update(&mut self) -> Result<Update, WatchError> {
        self.table.require_streaming()?;
        match self.script.pop_front() {
            Some(update) => update,
            None => {
                if let Some(token) = &self.on_drained {
                    token.cancel();
                }
                std::future::pending().await
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), WatchError> {
        if self.table.state() != SessionState::Closed {
            self.record(Call::Disconnect);
            self.table.closed();
        }
        Ok(())
    }
}

/// Sink recording every message; refuses delivery after `accept` messages
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<BroadcastMessage>>,
    accept: Option<usize>,
}

impl RecordingSink {
    pub fn disconnecting_after(accept: usize) -> Self {
        Self {
            accept: Some(accept),
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<BroadcastMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl BroadcastSink for RecordingSink {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkDeliveryError> {
        let mut messages = self.messages.lock();
        if self.accept.is_some_and(|n| messages.len() >= n) {
            return Err(SinkDeliveryError::Closed);
        }
        messages.push(message.clone());
        Ok(())
    }
}
