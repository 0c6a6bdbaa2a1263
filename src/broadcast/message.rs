//! Wire messages sent to listeners

use crate::stream::PriceEvent;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Greeting sent to every new listener
pub const WELCOME: &str = "welcome";

/// One JSON object per frame, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastMessage {
    /// Aggregate price of one account
    Price {
        symbol: String,
        price_type: String,
        status: String,
        price: f64,
        confidence: f64,
        /// Slot of the last aggregate update
        slot: u64,
    },
    /// Free-form notice
    Message { content: String },
}

impl BroadcastMessage {
    pub fn welcome() -> Self {
        BroadcastMessage::Message {
            content: WELCOME.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&PriceEvent> for BroadcastMessage {
    fn from(event: &PriceEvent) -> Self {
        BroadcastMessage::Price {
            symbol: event.symbol.clone(),
            price_type: event.price_type.to_string(),
            status: event.status.to_string(),
            price: event.price.to_f64().unwrap_or(f64::NAN),
            confidence: event.confidence.to_f64().unwrap_or(f64::NAN),
            slot: event.last_slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{AccountKey, PriceStatus, PriceType};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    fn event() -> PriceEvent {
        PriceEvent {
            key: AccountKey::new([2; 32]),
            product_key: AccountKey::new([1; 32]),
            symbol: "Crypto.BTC/USD".to_string(),
            price_type: PriceType::Price,
            status: PriceStatus::Trading,
            price: dec!(42000.5),
            confidence: dec!(12.25),
            last_slot: 10,
            valid_slot: 9,
        }
    }

    #[test]
    fn test_welcome_wire_format() {
        let json = BroadcastMessage::welcome().to_json().unwrap();
        assert_eq!(json, r#"{"type":"message","content":"welcome"}"#);
    }

    #[test]
    fn test_price_wire_format() {
        let json = BroadcastMessage::from(&event()).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "price",
                "symbol": "Crypto.BTC/USD",
                "price_type": "price",
                "status": "trading",
                "price": 42000.5,
                "confidence": 12.25,
                "slot": 10
            })
        );
    }

    #[test]
    fn test_status_names() {
        let mut halted = event();
        halted.status = PriceStatus::Halted;
        halted.price_type = PriceType::Unknown;
        let BroadcastMessage::Price {
            status, price_type, ..
        } = BroadcastMessage::from(&halted)
        else {
            panic!("expected price message");
        };
        assert_eq!(status, "halted");
        assert_eq!(price_type, "unknown");
    }

    #[test]
    fn test_parse_message() {
        let parsed: BroadcastMessage =
            serde_json::from_str(r#"{"type":"message","content":"welcome"}"#).unwrap();
        assert_eq!(parsed, BroadcastMessage::welcome());
    }
}
