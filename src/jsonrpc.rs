//! JSON-RPC 2.0 envelopes shared by the HTTP account source and the
//! pub/sub watch session

use base64::{prelude::BASE64_STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Build a request object
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Account encoding options sent with every account read or subscription
pub fn account_config(commitment: &str) -> Value {
    json!({ "encoding": "base64", "commitment": commitment })
}

/// Error object of a failed call
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Response envelope
#[derive(Debug, Deserialize)]
pub struct Response<T> {
    pub id: Option<u64>,
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

impl<T> Response<T> {
    pub fn into_result(self) -> Result<T, RpcErrorObject> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcErrorObject {
                code: -32603,
                message: "response carried neither result nor error".to_string(),
            }),
        }
    }
}

/// `{ "context": { "slot": .. }, "value": .. }`
#[derive(Debug, Deserialize)]
pub struct WithContext<T> {
    pub context: Context,
    pub value: T,
}

#[derive(Debug, Deserialize)]
pub struct Context {
    pub slot: u64,
}

/// Account payload returned with `encoding: base64`
#[derive(Debug, Clone, Deserialize)]
pub struct UiAccount {
    /// `[data, encoding]`
    pub data: (String, String),
}

/// Account payload paired with its key
#[derive(Debug, Clone, Deserialize)]
pub struct KeyedAccount {
    pub pubkey: String,
    pub account: UiAccount,
}

/// Errors decoding account data
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Unsupported account encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("Invalid base64 account data: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl UiAccount {
    pub fn decode_data(&self) -> Result<Vec<u8>, DataError> {
        let (data, encoding) = &self.data;
        if encoding != "base64" {
            return Err(DataError::UnsupportedEncoding(encoding.clone()));
        }
        Ok(BASE64_STANDARD.decode(data)?)
    }
}
