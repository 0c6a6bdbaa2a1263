//! On-chain account layouts (v2)
//!
//! Reads the fields this crate needs from mapping, product and price
//! accounts. Publisher components and derived statistics are skipped.

use super::types::scale;
use super::{AccountKey, PriceAccount, PriceStatus, PriceType, Product};
use std::collections::BTreeMap;
use thiserror::Error;

/// Magic number at the start of every oracle account
pub const MAGIC: u32 = 0xa1b2_c3d4;
/// Supported layout version
pub const VERSION: u32 = 2;

const HEADER_LEN: usize = 16;
const MAPPING_NEXT: usize = 24;
const MAPPING_PRODUCTS: usize = 56;
const PRODUCT_FIRST_PRICE: usize = 16;
const PRODUCT_ATTRS: usize = 48;
const PRICE_TYPE: usize = 16;
const PRICE_EXPONENT: usize = 20;
const PRICE_LAST_SLOT: usize = 32;
const PRICE_VALID_SLOT: usize = 40;
const PRICE_PRODUCT: usize = 112;
const PRICE_NEXT: usize = 144;
const PRICE_AGGREGATE: usize = 208;
/// Bytes needed to read everything up to the aggregate price info
pub const PRICE_MIN_LEN: usize = PRICE_AGGREGATE + 32;

/// Account kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Mapping,
    Product,
    Price,
    Other(u32),
}

impl From<u32> for AccountType {
    fn from(raw: u32) -> Self {
        match raw {
            1 => AccountType::Mapping,
            2 => AccountType::Product,
            3 => AccountType::Price,
            other => AccountType::Other(other),
        }
    }
}

/// Layout errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Account data too short: need {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Bad magic number: {0:#x}")]
    BadMagic(u32),
    #[error("Unsupported layout version: {0}")]
    UnsupportedVersion(u32),
    #[error("Expected {expected:?} account, found {actual:?}")]
    WrongType {
        expected: AccountType,
        actual: AccountType,
    },
    #[error("Malformed product attributes")]
    MalformedAttributes,
    #[error("Price value out of range")]
    ValueOutOfRange,
}

/// Decoded mapping account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingAccount {
    pub products: Vec<AccountKey>,
    pub next: Option<AccountKey>,
}

/// Decoded price account plus its chain link
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPrice {
    pub account: PriceAccount,
    pub next: Option<AccountKey>,
}

/// Read the account type from the common header
pub fn account_type(data: &[u8]) -> Result<AccountType, LayoutError> {
    let (kind, _) = header(data)?;
    Ok(kind)
}

pub fn decode_mapping(data: &[u8]) -> Result<MappingAccount, LayoutError> {
    expect_type(data, AccountType::Mapping)?;
    let count = read_u32(data, HEADER_LEN)? as usize;
    let next = link(read_key(data, MAPPING_NEXT)?);
    let products = (0..count)
        .map(|i| read_key(data, MAPPING_PRODUCTS + i * 32))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MappingAccount { products, next })
}

pub fn decode_product(key: AccountKey, data: &[u8]) -> Result<Product, LayoutError> {
    let size = expect_type(data, AccountType::Product)?;
    let first_price = link(read_key(data, PRODUCT_FIRST_PRICE)?);
    let end = size.min(data.len());

    let mut attrs = BTreeMap::new();
    let mut offset = PRODUCT_ATTRS;
    while offset < end {
        let (name, after_name) = read_str(data, offset, end)?;
        let (value, after_value) = read_str(data, after_name, end)?;
        attrs.insert(name, value);
        offset = after_value;
    }

    Ok(Product {
        key,
        attrs,
        first_price,
    })
}

pub fn decode_price(key: AccountKey, data: &[u8]) -> Result<DecodedPrice, LayoutError> {
    expect_type(data, AccountType::Price)?;
    ensure_len(data, PRICE_MIN_LEN)?;

    let exponent = read_u32(data, PRICE_EXPONENT)? as i32;
    let raw_price = read_u64(data, PRICE_AGGREGATE)? as i64;
    let raw_conf = read_u64(data, PRICE_AGGREGATE + 8)?;
    let status = read_u32(data, PRICE_AGGREGATE + 16)?;

    let account = PriceAccount {
        key,
        product_key: read_key(data, PRICE_PRODUCT)?,
        price_type: PriceType::from(read_u32(data, PRICE_TYPE)?),
        exponent,
        aggregate_status: PriceStatus::from(status),
        aggregate_price: scale(raw_price.into(), exponent).ok_or(LayoutError::ValueOutOfRange)?,
        aggregate_confidence: scale(raw_conf.into(), exponent)
            .ok_or(LayoutError::ValueOutOfRange)?,
        last_slot: read_u64(data, PRICE_LAST_SLOT)?,
        valid_slot: read_u64(data, PRICE_VALID_SLOT)?,
    };

    Ok(DecodedPrice {
        account,
        next: link(read_key(data, PRICE_NEXT)?),
    })
}

fn header(data: &[u8]) -> Result<(AccountType, usize), LayoutError> {
    ensure_len(data, HEADER_LEN)?;
    let magic = read_u32(data, 0)?;
    if magic != MAGIC {
        return Err(LayoutError::BadMagic(magic));
    }
    let version = read_u32(data, 4)?;
    if version != VERSION {
        return Err(LayoutError::UnsupportedVersion(version));
    }
    Ok((
        AccountType::from(read_u32(data, 8)?),
        read_u32(data, 12)? as usize,
    ))
}

fn expect_type(data: &[u8], expected: AccountType) -> Result<usize, LayoutError> {
    let (actual, size) = header(data)?;
    if actual != expected {
        return Err(LayoutError::WrongType { expected, actual });
    }
    Ok(size)
}

fn ensure_len(data: &[u8], expected: usize) -> Result<(), LayoutError> {
    if data.len() < expected {
        return Err(LayoutError::TooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn bytes<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], LayoutError> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(LayoutError::TooShort {
            expected: offset + N,
            actual: data.len(),
        })
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, LayoutError> {
    bytes::<4>(data, offset).map(u32::from_le_bytes)
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, LayoutError> {
    bytes::<8>(data, offset).map(u64::from_le_bytes)
}

fn read_key(data: &[u8], offset: usize) -> Result<AccountKey, LayoutError> {
    bytes::<32>(data, offset).map(AccountKey::new)
}

/// Length-prefixed string; returns the string and the offset after it
fn read_str(data: &[u8], offset: usize, end: usize) -> Result<(String, usize), LayoutError> {
    let len = *data.get(offset).ok_or(LayoutError::MalformedAttributes)? as usize;
    let start = offset + 1;
    if start + len > end {
        return Err(LayoutError::MalformedAttributes);
    }
    let s = std::str::from_utf8(&data[start..start + len])
        .map_err(|_| LayoutError::MalformedAttributes)?;
    Ok((s.to_string(), start + len))
}

fn link(key: AccountKey) -> Option<AccountKey> {
    (!key.is_zero()).then_some(key)
}

/// Builders for test fixtures and benches
#[doc(hidden)]
pub mod fixtures {
    use super::*;

    fn header(kind: u32, size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        data.extend_from_slice(&MAGIC.to_le_bytes());
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&kind.to_le_bytes());
        data.extend_from_slice(&(size as u32).to_le_bytes());
        data
    }

    pub fn mapping(products: &[AccountKey], next: Option<AccountKey>) -> Vec<u8> {
        let size = MAPPING_PRODUCTS + products.len() * 32;
        let mut data = header(1, size);
        data.extend_from_slice(&(products.len() as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(next.unwrap_or_default().as_bytes());
        for p in products {
            data.extend_from_slice(p.as_bytes());
        }
        data
    }

    pub fn product(first_price: Option<AccountKey>, attrs: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (k, v) in attrs {
            body.push(k.len() as u8);
            body.extend_from_slice(k.as_bytes());
            body.push(v.len() as u8);
            body.extend_from_slice(v.as_bytes());
        }
        let mut data = header(2, PRODUCT_ATTRS + body.len());
        data.extend_from_slice(first_price.unwrap_or_default().as_bytes());
        data.resize(PRODUCT_ATTRS, 0);
        data.extend_from_slice(&body);
        data
    }

    /// Price account with the given aggregate and slots
    pub struct PriceFixture {
        pub product: AccountKey,
        pub next: Option<AccountKey>,
        pub exponent: i32,
        pub price: i64,
        pub confidence: u64,
        pub status: u32,
        pub last_slot: u64,
        pub valid_slot: u64,
    }

    impl PriceFixture {
        pub fn new(product: AccountKey) -> Self {
            Self {
                product,
                next: None,
                exponent: -8,
                price: 0,
                confidence: 0,
                status: 1,
                last_slot: 0,
                valid_slot: 0,
            }
        }

        pub fn encode(&self) -> Vec<u8> {
            let mut data = vec![0u8; PRICE_MIN_LEN];
            let put = |data: &mut Vec<u8>, offset: usize, bytes: &[u8]| {
                data[offset..offset + bytes.len()].copy_from_slice(bytes);
            };
            put(&mut data, 0, &MAGIC.to_le_bytes());
            put(&mut data, 4, &VERSION.to_le_bytes());
            put(&mut data, 8, &3u32.to_le_bytes());
            put(&mut data, 12, &(PRICE_MIN_LEN as u32).to_le_bytes());
            put(&mut data, PRICE_TYPE, &1u32.to_le_bytes());
            put(&mut data, PRICE_EXPONENT, &self.exponent.to_le_bytes());
            put(&mut data, PRICE_LAST_SLOT, &self.last_slot.to_le_bytes());
            put(&mut data, PRICE_VALID_SLOT, &self.valid_slot.to_le_bytes());
            put(&mut data, PRICE_PRODUCT, self.product.as_bytes());
            put(&mut data, PRICE_NEXT, self.next.unwrap_or_default().as_bytes());
            put(&mut data, PRICE_AGGREGATE, &self.price.to_le_bytes());
            put(&mut data, PRICE_AGGREGATE + 8, &self.confidence.to_le_bytes());
            put(&mut data, PRICE_AGGREGATE + 16, &self.status.to_le_bytes());
            data
        }
    }
}
