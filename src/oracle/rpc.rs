//! HTTP JSON-RPC account source
//!
//! Walks the mapping chain to find products, then each product's price
//! chain, batching reads through `getMultipleAccounts`.

use super::layout;
use super::{AccountKey, AccountSource, PriceAccount, Product, SourceError};
use crate::jsonrpc::{account_config, request, KeyedAccount, Response, UiAccount, WithContext};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Accounts per `getMultipleAccounts` call
const MAX_ACCOUNTS_PER_REQUEST: usize = 100;

/// Default commitment for account reads
pub const DEFAULT_COMMITMENT: &str = "confirmed";

#[derive(Debug, Default)]
struct Snapshot {
    products: Vec<Product>,
    prices: HashMap<AccountKey, Vec<PriceAccount>>,
}

/// Account source backed by a Solana HTTP RPC endpoint
pub struct RpcAccountSource {
    client: reqwest::Client,
    endpoint: String,
    commitment: String,
    mapping_key: AccountKey,
    program_key: Option<AccountKey>,
    snapshot: RwLock<Snapshot>,
    request_id: AtomicU64,
}

impl RpcAccountSource {
    /// Create a source reading the directory rooted at `mapping_key`
    pub fn new(endpoint: impl Into<String>, mapping_key: AccountKey) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            mapping_key,
            program_key: None,
            snapshot: RwLock::new(Snapshot::default()),
            request_id: AtomicU64::new(1),
        }
    }

    /// Enumerate all accounts through the oracle program
    pub fn with_program(mut self, program_key: AccountKey) -> Self {
        self.program_key = Some(program_key);
        self
    }

    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, SourceError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let response: Response<T> = self
            .client
            .post(&self.endpoint)
            .json(&request(id, method, params))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_result().map_err(SourceError::Rpc)
    }

    /// Raw data of each account, in the order requested
    async fn fetch_accounts(&self, keys: &[AccountKey]) -> Result<Vec<Vec<u8>>, SourceError> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_ACCOUNTS_PER_REQUEST) {
            let encoded: Vec<String> = chunk.iter().map(ToString::to_string).collect();
            let result: WithContext<Vec<Option<UiAccount>>> = self
                .call(
                    "getMultipleAccounts",
                    json!([encoded, account_config(&self.commitment)]),
                )
                .await?;

            if let Some(key) = chunk.get(result.value.len()) {
                tracing::warn!(
                    requested = chunk.len(),
                    returned = result.value.len(),
                    "Account batch cut short"
                );
                return Err(SourceError::MissingAccount(*key));
            }
            for (key, account) in chunk.iter().zip(result.value) {
                let account = account.ok_or(SourceError::MissingAccount(*key))?;
                out.push(account.decode_data()?);
            }
        }
        Ok(out)
    }

    async fn product_keys(&self) -> Result<Vec<AccountKey>, SourceError> {
        let mut keys = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.mapping_key);

        while let Some(mapping_key) = next {
            if !visited.insert(mapping_key) {
                tracing::warn!(key = %mapping_key, "Mapping chain loops back, stopping");
                break;
            }
            let data = self
                .fetch_accounts(&[mapping_key])
                .await?
                .pop()
                .ok_or(SourceError::MissingAccount(mapping_key))?;
            let mapping = layout::decode_mapping(&data).map_err(|source| SourceError::Layout {
                key: mapping_key,
                source,
            })?;
            keys.extend(mapping.products);
            next = mapping.next;
        }

        Ok(keys)
    }

    /// Follow every product's price chain breadth-first
    async fn load_prices(
        &self,
        products: &[Product],
    ) -> Result<HashMap<AccountKey, Vec<PriceAccount>>, SourceError> {
        let mut prices: HashMap<AccountKey, Vec<PriceAccount>> =
            products.iter().map(|p| (p.key, Vec::new())).collect();
        let mut frontier: Vec<(AccountKey, AccountKey)> = products
            .iter()
            .filter_map(|p| p.first_price.map(|price| (p.key, price)))
            .collect();
        let mut visited: HashSet<AccountKey> = frontier.iter().map(|(_, k)| *k).collect();

        while !frontier.is_empty() {
            let keys: Vec<AccountKey> = frontier.iter().map(|(_, k)| *k).collect();
            let data = self.fetch_accounts(&keys).await?;

            let mut next_frontier = Vec::new();
            for ((product_key, price_key), raw) in frontier.into_iter().zip(data) {
                let decoded = layout::decode_price(price_key, &raw).map_err(|source| {
                    SourceError::Layout {
                        key: price_key,
                        source,
                    }
                })?;
                if let Some(next) = decoded.next {
                    if visited.insert(next) {
                        next_frontier.push((product_key, next));
                    }
                }
                prices.entry(product_key).or_default().push(decoded.account);
            }
            frontier = next_frontier;
        }

        Ok(prices)
    }
}

#[async_trait]
impl AccountSource for RpcAccountSource {
    async fn refresh_all(&self) -> Result<(), SourceError> {
        let keys = self.product_keys().await?;
        let data = self.fetch_accounts(&keys).await?;
        let products = keys
            .into_iter()
            .zip(data)
            .map(|(key, raw)| {
                layout::decode_product(key, &raw).map_err(|source| SourceError::Layout { key, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let prices = self.load_prices(&products).await?;

        tracing::info!(
            products = products.len(),
            prices = prices.values().map(Vec::len).sum::<usize>(),
            "Refreshed oracle accounts"
        );

        *self.snapshot.write().await = Snapshot { products, prices };
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, SourceError> {
        Ok(self.snapshot.read().await.products.clone())
    }

    async fn list_prices(&self, product: &Product) -> Result<Vec<PriceAccount>, SourceError> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.prices.get(&product.key).cloned().unwrap_or_default())
    }

    async fn list_all_accounts(&self) -> Result<BTreeSet<AccountKey>, SourceError> {
        let Some(program) = self.program_key else {
            let snapshot = self.snapshot.read().await;
            let mut keys: BTreeSet<AccountKey> = BTreeSet::new();
            keys.insert(self.mapping_key);
            keys.extend(snapshot.products.iter().map(|p| p.key));
            keys.extend(snapshot.prices.values().flatten().map(|p| p.key));
            return Ok(keys);
        };

        let mut config = account_config(&self.commitment);
        config["dataSlice"] = json!({ "offset": 0, "length": 0 });
        let accounts: Vec<KeyedAccount> = self
            .call("getProgramAccounts", json!([program.to_string(), config]))
            .await?;

        accounts
            .iter()
            .map(|a| a.pubkey.parse::<AccountKey>().map_err(SourceError::from))
            .collect()
    }
}
