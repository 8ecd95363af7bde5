//! Typed vendor messages for the brokerage streaming API.
//!
//! Only the fields the bot acts on are modeled. Numeric fields arrive as
//! either JSON numbers or strings depending on the endpoint, so ids and
//! flags go through lenient deserializers.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::bot::config::ContractType;
use crate::error::WsError;
use crate::stats::last_digit;

/// Vendor error codes that are safe to ignore.
const BENIGN_ERROR_CODES: &[&str] = &["AlreadySubscribed", "InvalidUnsubscribe", "InvalidSubscriptionId"];

/// Vendor error codes that invalidate the session.
const AUTH_ERROR_CODES: &[&str] = &[
    "InvalidToken",
    "AuthorizationRequired",
    "InvalidAppID",
    "DisabledClient",
    "PermissionDenied",
];

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Purchase command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyContract {
    /// Always "1": buy the contract described by `parameters`.
    pub buy: String,
    /// Maximum price willing to pay.
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    /// Contract parameters.
    pub parameters: ContractParameters,
}

/// Parameters of a digit contract purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractParameters {
    /// Stake amount.
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
    /// Always "stake".
    pub basis: String,
    /// Digit contract type.
    pub contract_type: ContractType,
    /// Account currency.
    pub currency: String,
    /// Duration in `duration_unit`.
    pub duration: u8,
    /// Always "t" (ticks).
    pub duration_unit: String,
    /// Market symbol.
    pub symbol: String,
    /// Predicted digit, absent for even/odd.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier: Option<String>,
}

/// Session authorization.
#[derive(Debug, Clone, Serialize)]
struct Authorize<'a> {
    authorize: &'a str,
}

/// Tick stream subscription.
#[derive(Debug, Clone, Serialize)]
struct TicksSubscribe<'a> {
    ticks: &'a str,
    subscribe: u8,
}

/// Open contract subscription.
#[derive(Debug, Clone, Serialize)]
struct ContractSubscribe {
    proposal_open_contract: u8,
    contract_id: Value,
    subscribe: u8,
}

/// Keep-alive.
#[derive(Debug, Clone, Serialize)]
struct Ping {
    ping: u8,
}

/// Commands sent over the brokerage socket.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    /// Authorize the session with an API token.
    Authorize(String),
    /// Subscribe to ticks for a symbol.
    SubscribeTicks(String),
    /// Purchase a contract.
    Buy(BuyContract),
    /// Stream updates for a purchased contract.
    SubscribeContract(String),
    /// Keep the connection alive.
    Ping,
}

impl OutboundRequest {
    /// Serialize to the vendor JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundRequest::Authorize(token) => serde_json::to_string(&Authorize { authorize: token }),
            OutboundRequest::SubscribeTicks(symbol) => serde_json::to_string(&TicksSubscribe {
                ticks: symbol,
                subscribe: 1,
            }),
            OutboundRequest::Buy(buy) => serde_json::to_string(buy),
            OutboundRequest::SubscribeContract(contract_id) => {
                // Contract ids are numeric on the wire.
                let contract_id = contract_id
                    .parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(contract_id.as_str()));
                serde_json::to_string(&ContractSubscribe {
                    proposal_open_contract: 1,
                    contract_id,
                    subscribe: 1,
                })
            }
            OutboundRequest::Ping => serde_json::to_string(&Ping { ping: 1 }),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundRequest::Authorize(_) => "authorize",
            OutboundRequest::SubscribeTicks(_) => "ticks",
            OutboundRequest::Buy(_) => "buy",
            OutboundRequest::SubscribeContract(_) => "proposal_open_contract",
            OutboundRequest::Ping => "ping",
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Successful authorization.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthorizeInfo {
    /// Account login id.
    #[serde(default)]
    pub loginid: Option<String>,
    /// Account currency.
    #[serde(default)]
    pub currency: Option<String>,
    /// Account balance.
    #[serde(default)]
    pub balance: Option<Decimal>,
}

/// Buy confirmation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BuyReceipt {
    /// Vendor-assigned contract id.
    #[serde(deserialize_with = "de_id")]
    pub contract_id: String,
    /// Price actually paid.
    pub buy_price: Decimal,
    /// Human-readable description.
    #[serde(default)]
    pub longcode: String,
    /// Balance after purchase.
    #[serde(default)]
    pub balance_after: Option<Decimal>,
}

/// Streaming update for an open contract.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContractUpdate {
    /// Vendor-assigned contract id.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub contract_id: Option<String>,
    /// Contract has been sold or expired.
    #[serde(default, deserialize_with = "de_flag")]
    pub is_sold: bool,
    /// "open", "won", "lost" or "sold".
    #[serde(default)]
    pub status: Option<String>,
    /// Net profit (negative on loss).
    #[serde(default)]
    pub profit: Decimal,
    /// Gross payout.
    #[serde(default)]
    pub payout: Decimal,
    /// Market symbol.
    #[serde(default)]
    pub underlying: Option<String>,
    /// Entry tick quote.
    #[serde(default)]
    pub entry_tick: Option<Decimal>,
    /// Entry tick as displayed, keeping trailing zeros.
    #[serde(default)]
    pub entry_tick_display_value: Option<String>,
    /// Exit tick quote.
    #[serde(default)]
    pub exit_tick: Option<Decimal>,
    /// Exit tick as displayed, keeping trailing zeros.
    #[serde(default)]
    pub exit_tick_display_value: Option<String>,
}

impl ContractUpdate {
    /// Whether this update carries a final result.
    pub fn is_settled(&self) -> bool {
        self.is_sold && self.status.as_deref() != Some("open")
    }

    /// Whether the contract was won.
    pub fn is_won(&self) -> bool {
        match self.status.as_deref() {
            Some("won") => true,
            Some("lost") => false,
            _ => self.profit > Decimal::ZERO,
        }
    }

    /// Last digit of the entry tick.
    pub fn entry_digit(&self) -> Option<u8> {
        tick_digit(self.entry_tick_display_value.as_deref(), self.entry_tick)
    }

    /// Last digit of the exit tick.
    pub fn exit_digit(&self) -> Option<u8> {
        tick_digit(self.exit_tick_display_value.as_deref(), self.exit_tick)
    }
}

fn tick_digit(display: Option<&str>, quote: Option<Decimal>) -> Option<u8> {
    display
        .and_then(|d| d.trim().chars().last())
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
        .or_else(|| quote.map(|q| last_digit(q, None)))
}

/// Market tick.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Tick {
    /// Market symbol.
    pub symbol: String,
    /// Quote.
    pub quote: Decimal,
    /// Number of decimals the market quotes in.
    #[serde(default, deserialize_with = "de_opt_u32")]
    pub pip_size: Option<u32>,
    /// Unix epoch seconds.
    #[serde(default)]
    pub epoch: i64,
}

/// Vendor error payload.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct VendorError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// How the bot reacts to a vendor error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorErrorClass {
    /// Duplicate subscription and similar; ignored.
    Benign,
    /// Session is not authorized; trading must stop.
    Authorization,
    /// Anything else; surfaced to the user.
    Other,
}

impl VendorError {
    /// Classify this error.
    pub fn class(&self) -> VendorErrorClass {
        let message = self.message.to_lowercase();
        if BENIGN_ERROR_CODES.contains(&self.code.as_str())
            || message.contains("already subscribed")
            || message.contains("invalid unsubscribe")
        {
            VendorErrorClass::Benign
        } else if AUTH_ERROR_CODES.contains(&self.code.as_str()) {
            VendorErrorClass::Authorization
        } else {
            VendorErrorClass::Other
        }
    }
}

/// Parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Session authorized.
    Authorized(AuthorizeInfo),
    /// Purchase confirmed.
    BuyConfirmed(BuyReceipt),
    /// Open contract update.
    ContractUpdate(ContractUpdate),
    /// Market tick.
    Tick(Tick),
    /// Keep-alive reply.
    Pong,
    /// Vendor error in reply to a request of type `msg_type`.
    Error {
        /// Request type that failed.
        msg_type: Option<String>,
        /// Error payload.
        error: VendorError,
    },
    /// Any other message type.
    Other(String),
}

/// Parse one text frame.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, WsError> {
    let mut value: Value = serde_json::from_str(text).map_err(|e| WsError::ParseError(e.to_string()))?;

    let msg_type = value
        .get("msg_type")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(error) = value.get_mut("error").map(Value::take) {
        let error: VendorError = serde_json::from_value(error).map_err(|e| WsError::ParseError(e.to_string()))?;
        return Ok(InboundMessage::Error { msg_type, error });
    }

    let Some(msg_type) = msg_type else {
        return Err(WsError::ParseError("missing msg_type".to_string()));
    };

    let body = value.get_mut(msg_type.as_str()).map(Value::take).unwrap_or(Value::Null);
    let parse_err = |e: serde_json::Error| WsError::ParseError(format!("{msg_type}: {e}"));

    let message = match msg_type.as_str() {
        "authorize" => InboundMessage::Authorized(serde_json::from_value(body).map_err(parse_err)?),
        "buy" => InboundMessage::BuyConfirmed(serde_json::from_value(body).map_err(parse_err)?),
        "proposal_open_contract" => {
            InboundMessage::ContractUpdate(serde_json::from_value(body).map_err(parse_err)?)
        }
        "tick" => InboundMessage::Tick(serde_json::from_value(body).map_err(parse_err)?),
        "ping" => InboundMessage::Pong,
        _ => InboundMessage::Other(msg_type.clone()),
    };

    Ok(message)
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_u64().is_some_and(|n| n != 0)),
        Value::String(s) => Ok(s == "1" || s.eq_ignore_ascii_case("true")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid flag: {other}"))),
    }
}

fn de_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_u64().and_then(|n| u32::try_from(n).ok())),
        Value::String(s) => Ok(s.parse().ok()),
        other => Err(serde::de::Error::custom(format!("invalid integer: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::config::{BotConfiguration, TradeType};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_serializes_numbers_and_barrier() {
        let config = BotConfiguration::new("R_100", TradeType::Under, 5, 7, dec!(1.5));
        let json = OutboundRequest::Buy(config.purchase(dec!(1.5))).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "buy": "1",
                "price": 1.5,
                "parameters": {
                    "amount": 1.5,
                    "basis": "stake",
                    "contract_type": "DIGITUNDER",
                    "currency": "USD",
                    "duration": 5,
                    "duration_unit": "t",
                    "symbol": "R_100",
                    "barrier": "7"
                }
            })
        );
    }

    #[test]
    fn contract_subscription_uses_numeric_id() {
        let json = OutboundRequest::SubscribeContract("245561238".to_string()).to_json().unwrap();
        assert_eq!(json, r#"{"proposal_open_contract":1,"contract_id":245561238,"subscribe":1}"#);
    }

    #[test]
    fn parses_buy_confirmation() {
        let text = r#"{"msg_type":"buy","buy":{"contract_id":245561238,"buy_price":1,"longcode":"Win payout if the last digit of Volatility 100 Index is 5 after 1 ticks.","balance_after":99}}"#;

        match parse_inbound(text).unwrap() {
            InboundMessage::BuyConfirmed(receipt) => {
                assert_eq!(receipt.contract_id, "245561238");
                assert_eq!(receipt.buy_price, dec!(1));
                assert!(receipt.longcode.starts_with("Win payout"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_settled_contract() {
        let text = r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":"42","is_sold":1,"status":"lost","profit":-1,"payout":9.5,"entry_tick_display_value":"1234.50","exit_tick":1234.57}}"#;

        let InboundMessage::ContractUpdate(update) = parse_inbound(text).unwrap() else {
            panic!("expected contract update");
        };

        assert!(update.is_settled());
        assert!(!update.is_won());
        assert_eq!(update.profit, dec!(-1));
        assert_eq!(update.entry_digit(), Some(0));
        assert_eq!(update.exit_digit(), Some(7));
    }

    #[test]
    fn open_contract_is_not_settled() {
        let update = ContractUpdate {
            contract_id: Some("1".to_string()),
            is_sold: false,
            status: Some("open".to_string()),
            profit: dec!(0.5),
            payout: dec!(1.9),
            underlying: None,
            entry_tick: None,
            entry_tick_display_value: None,
            exit_tick: None,
            exit_tick_display_value: None,
        };
        assert!(!update.is_settled());
    }

    #[test]
    fn parses_tick() {
        let text = r#"{"msg_type":"tick","tick":{"symbol":"R_100","quote":812.34,"pip_size":2,"epoch":1700000000}}"#;
        let InboundMessage::Tick(tick) = parse_inbound(text).unwrap() else {
            panic!("expected tick");
        };
        assert_eq!(tick.symbol, "R_100");
        assert_eq!(tick.pip_size, Some(2));
    }

    #[test]
    fn parses_error_with_request_type() {
        let text = r#"{"msg_type":"buy","error":{"code":"InvalidToken","message":"The token is invalid."}}"#;
        let InboundMessage::Error { msg_type, error } = parse_inbound(text).unwrap() else {
            panic!("expected error");
        };
        assert_eq!(msg_type.as_deref(), Some("buy"));
        assert_eq!(error.class(), VendorErrorClass::Authorization);
    }

    #[test]
    fn classifies_duplicate_subscription_as_benign() {
        let error = VendorError {
            code: "AlreadySubscribed".to_string(),
            message: "You are already subscribed to R_100".to_string(),
        };
        assert_eq!(error.class(), VendorErrorClass::Benign);

        let other = VendorError {
            code: "ContractBuyValidationError".to_string(),
            message: "Stake too low".to_string(),
        };
        assert_eq!(other.class(), VendorErrorClass::Other);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"foo":1}"#).is_err());
    }

    #[test]
    fn unknown_types_pass_through() {
        assert_eq!(
            parse_inbound(r#"{"msg_type":"balance","balance":{}}"#).unwrap(),
            InboundMessage::Other("balance".to_string())
        );
        assert_eq!(parse_inbound(r#"{"msg_type":"ping","ping":"pong"}"#).unwrap(), InboundMessage::Pong);
    }
}
