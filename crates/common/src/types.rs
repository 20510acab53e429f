use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One OHLC candle. Windows are always ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// A spot trading pair, e.g. `ETH/EUR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Exchange symbol with no separator (`ETHEUR`).
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(Pair::new(base.trim(), quote.trim()))
            }
            _ => Err(Error::Config(format!(
                "pair must look like 'BASE/QUOTE', got '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for Pair {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// An order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: Pair,
    pub side: OrderSide,
    /// Amount in base asset units.
    pub volume: f64,
    /// `None` = market order; `Some(price)` = limit order.
    pub price: Option<f64>,
}

impl Order {
    pub fn market(pair: Pair, side: OrderSide, volume: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair,
            side,
            volume,
            price: None,
        }
    }
}

/// Confirmation of a placed order returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: Pair,
    pub side: OrderSide,
    pub price: f64,
    pub volume: f64,
    /// Fee charged in quote currency.
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle state of an order as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
}

impl OrderStatus {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Closed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Closed => write!(f, "closed"),
            OrderStatus::Canceled => write!(f, "canceled"),
            OrderStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Full order record as returned by `ExchangeClient::fetch_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub id: String,
    pub pair: Pair,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Average execution price.
    pub price: f64,
    /// Executed volume in base units.
    pub volume: f64,
    /// Quote amount spent or received, excluding fee.
    pub cost: f64,
    pub fee: f64,
    pub opened_at: DateTime<Utc>,
}

/// Free balance per asset symbol.
pub type Balances = HashMap<String, f64>;

/// Discrete outcome of one evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// An open position held in the ledger. Field names match the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub price: f64,
    pub volume: f64,
    /// Quote spent including fee.
    pub cost: f64,
    #[serde(rename = "timeStamp")]
    pub time_stamp: DateTime<Utc>,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(Error::Config(format!(
                "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
            ))),
        }
    }
}
