//! Product and price account types

use super::AccountKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of value a price account publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Unknown,
    Price,
}

impl From<u32> for PriceType {
    fn from(raw: u32) -> Self {
        match raw {
            1 => PriceType::Price,
            _ => PriceType::Unknown,
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceType::Unknown => write!(f, "unknown"),
            PriceType::Price => write!(f, "price"),
        }
    }
}

/// Status of the aggregate price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceStatus {
    Unknown,
    Trading,
    Halted,
    Auction,
    Ignored,
}

impl From<u32> for PriceStatus {
    fn from(raw: u32) -> Self {
        match raw {
            1 => PriceStatus::Trading,
            2 => PriceStatus::Halted,
            3 => PriceStatus::Auction,
            4 => PriceStatus::Ignored,
            _ => PriceStatus::Unknown,
        }
    }
}

impl fmt::Display for PriceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceStatus::Unknown => "unknown",
            PriceStatus::Trading => "trading",
            PriceStatus::Halted => "halted",
            PriceStatus::Auction => "auction",
            PriceStatus::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

/// A tradable instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product account key
    pub key: AccountKey,
    /// Reference attributes (symbol, asset_type, ...)
    pub attrs: BTreeMap<String, String>,
    /// Head of the product's price account chain
    pub first_price: Option<AccountKey>,
}

impl Product {
    /// Trading symbol, empty when the product carries none
    pub fn symbol(&self) -> &str {
        self.attrs.get("symbol").map(String::as_str).unwrap_or("")
    }
}

/// Aggregate price state of one price account
///
/// Belongs to exactly one [`Product`] through `product_key`. The catalog
/// refreshes the fields in place on each update; the key never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAccount {
    /// Price account key
    pub key: AccountKey,
    /// Owning product
    pub product_key: AccountKey,
    pub price_type: PriceType,
    /// Decimal exponent applied to the raw integer fields
    pub exponent: i32,
    pub aggregate_status: PriceStatus,
    pub aggregate_price: Decimal,
    pub aggregate_confidence: Decimal,
    /// Slot of the most recent publisher update
    pub last_slot: u64,
    /// Slot at which the aggregate was computed
    pub valid_slot: u64,
}

/// Scale a raw integer by `10^exponent`
pub fn scale(raw: i128, exponent: i32) -> Option<Decimal> {
    if exponent <= 0 {
        Decimal::try_from_i128_with_scale(raw, exponent.unsigned_abs()).ok()
    } else {
        let factor = 10u64.checked_pow(exponent.unsigned_abs())?;
        Decimal::try_from_i128_with_scale(raw, 0)
            .ok()?
            .checked_mul(Decimal::from(factor))
    }
}
