//! In-memory registry of products and their price accounts

use super::{AccountKey, PriceAccount, Product};
use std::collections::HashMap;

/// Result of applying a price update to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Existing account refreshed in place
    Updated,
    /// First sighting of this account
    Inserted,
    /// Update older than the stored state; nothing changed
    Stale { last_slot: u64, valid_slot: u64 },
}

/// Flat registry of every price collected during bootstrap
///
/// Price accounts keep their identity for the whole session; updates only
/// refresh fields, and never move `last_slot`/`valid_slot` backwards.
#[derive(Debug, Default)]
pub struct Catalog {
    products: HashMap<AccountKey, Product>,
    prices: HashMap<AccountKey, PriceAccount>,
    /// Price keys in collection order
    order: Vec<AccountKey>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.key, product);
    }

    /// Register a price account; re-inserting a known key refreshes it
    pub fn insert_price(&mut self, price: PriceAccount) {
        if !self.prices.contains_key(&price.key) {
            self.order.push(price.key);
        }
        self.prices.insert(price.key, price);
    }

    pub fn product(&self, key: &AccountKey) -> Option<&Product> {
        self.products.get(key)
    }

    pub fn price(&self, key: &AccountKey) -> Option<&PriceAccount> {
        self.prices.get(key)
    }

    /// Price keys in the order they were collected
    pub fn price_keys(&self) -> &[AccountKey] {
        &self.order
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn price_count(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Symbol of the product owning `price`, if the product is known
    pub fn symbol_of(&self, price: &PriceAccount) -> Option<&str> {
        self.products
            .get(&price.product_key)
            .map(Product::symbol)
            .filter(|s| !s.is_empty())
    }

    /// Apply a streamed price update
    pub fn apply(&mut self, update: PriceAccount) -> ApplyOutcome {
        match self.prices.get_mut(&update.key) {
            Some(current) => {
                if update.last_slot < current.last_slot || update.valid_slot < current.valid_slot
                {
                    return ApplyOutcome::Stale {
                        last_slot: current.last_slot,
                        valid_slot: current.valid_slot,
                    };
                }
                *current = update;
                ApplyOutcome::Updated
            }
            None => {
                self.insert_price(update);
                ApplyOutcome::Inserted
            }
        }
    }
}
