use async_trait::async_trait;

use crate::{Balances, Candle, Fill, Order, OrderDetails, Pair, Result};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
/// `RateLimitedClient` wraps any implementation so every call spends a token.
///
/// Venue failures that are worth repeating (lockouts, throttling, dropped
/// connections) must surface as `Error::TransientExchange`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Recent candles for `pair`, oldest first. The last one may still be open.
    async fn fetch_candles(&self, pair: &Pair, interval_minutes: u32) -> Result<Vec<Candle>>;

    /// Free balance per asset.
    async fn fetch_balance(&self) -> Result<Balances>;

    /// Place an order and return the fill confirmation.
    async fn place_order(&self, order: &Order) -> Result<Fill>;

    /// Look up an order previously placed through `place_order`.
    async fn fetch_order(&self, id: &str, pair: &Pair) -> Result<OrderDetails>;
}
