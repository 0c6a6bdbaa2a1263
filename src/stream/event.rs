//! Price event emitted for each routed update

use crate::oracle::{AccountKey, PriceAccount, PriceStatus, PriceType};
use rust_decimal::Decimal;

/// A price update joined with its product symbol
#[derive(Debug, Clone, PartialEq)]
pub struct PriceEvent {
    pub key: AccountKey,
    pub product_key: AccountKey,
    /// Product symbol, or the product key when the product has none
    pub symbol: String,
    pub price_type: PriceType,
    pub status: PriceStatus,
    pub price: Decimal,
    pub confidence: Decimal,
    pub last_slot: u64,
    pub valid_slot: u64,
}

impl PriceEvent {
    pub fn new(account: &PriceAccount, symbol: Option<&str>) -> Self {
        Self {
            key: account.key,
            product_key: account.product_key,
            symbol: symbol
                .map(str::to_string)
                .unwrap_or_else(|| account.product_key.to_string()),
            price_type: account.price_type,
            status: account.aggregate_status,
            price: account.aggregate_price,
            confidence: account.aggregate_confidence,
            last_slot: account.last_slot,
            valid_slot: account.valid_slot,
        }
    }
}
