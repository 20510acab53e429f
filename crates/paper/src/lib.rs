use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Balances, Candle, Error, ExchangeClient, Fill, Order, OrderDetails, OrderSide, OrderStatus,
    Pair, Result,
};

/// Rounding slack when comparing simulated balances.
const BALANCE_EPSILON: f64 = 1e-9;

/// Where the paper client gets its candles from.
enum MarketData {
    /// A real venue's public market data.
    Upstream(Arc<dyn ExchangeClient>),
    /// A fixed series, for tests and offline runs.
    Seeded(RwLock<Vec<Candle>>),
}

#[derive(Default)]
struct PaperState {
    balances: Balances,
    /// Last close seen per pair symbol, refreshed on every candle fetch.
    prices: HashMap<String, f64>,
    orders: HashMap<String, OrderDetails>,
}

/// Simulated exchange client for paper trading.
///
/// Fills market orders at the latest close with configurable slippage and
/// fee, and keeps simulated balances. No real orders are ever sent.
pub struct PaperClient {
    market: MarketData,
    state: Arc<RwLock<PaperState>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    /// Fee in percent of the quote amount.
    fee_pct: f64,
}

impl PaperClient {
    /// Start with `initial_balance` of `quote_asset` and an empty candle series.
    pub fn new(
        quote_asset: impl Into<String>,
        initial_balance: f64,
        slippage_bps: f64,
        fee_pct: f64,
    ) -> Self {
        let quote_asset = quote_asset.into();
        info!(
            asset = %quote_asset,
            balance = initial_balance,
            slippage_bps,
            fee_pct,
            "PaperClient initialized"
        );
        let mut state = PaperState::default();
        state.balances.insert(quote_asset, initial_balance);
        Self {
            market: MarketData::Seeded(RwLock::new(Vec::new())),
            state: Arc::new(RwLock::new(state)),
            slippage_bps,
            fee_pct,
        }
    }

    /// Take candles from a real client instead of the seeded series.
    pub fn with_upstream(mut self, upstream: Arc<dyn ExchangeClient>) -> Self {
        self.market = MarketData::Upstream(upstream);
        self
    }

    /// Replace the seeded candle series. No effect with an upstream.
    pub async fn seed_candles(&self, candles: Vec<Candle>) {
        if let MarketData::Seeded(series) = &self.market {
            *series.write().await = candles;
        }
    }

    pub async fn set_balance(&self, asset: impl Into<String>, amount: f64) {
        self.state.write().await.balances.insert(asset.into(), amount);
    }

    /// Set the fill reference price for `pair` directly.
    pub async fn update_price(&self, pair: &Pair, price: f64) {
        self.state.write().await.prices.insert(pair.symbol(), price);
    }

    fn fill_price(&self, mid: f64, side: OrderSide) -> f64 {
        // Buys pay more, sells receive less
        match side {
            OrderSide::Buy => mid * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn fetch_candles(&self, pair: &Pair, interval_minutes: u32) -> Result<Vec<Candle>> {
        let candles = match &self.market {
            MarketData::Upstream(client) => client.fetch_candles(pair, interval_minutes).await?,
            MarketData::Seeded(series) => series.read().await.clone(),
        };
        if let Some(last) = candles.last() {
            self.state.write().await.prices.insert(pair.symbol(), last.close);
        }
        Ok(candles)
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        Ok(self.state.read().await.balances.clone())
    }

    async fn place_order(&self, order: &Order) -> Result<Fill> {
        if order.price.is_some() {
            return Err(Error::InvalidOrder("paper trading fills market orders only".into()));
        }
        if !(order.volume > 0.0) {
            return Err(Error::InvalidOrder(format!(
                "order volume must be positive, got {}",
                order.volume
            )));
        }

        let mut state = self.state.write().await;
        let mid = state.prices.get(&order.pair.symbol()).copied().ok_or_else(|| {
            Error::Exchange(format!(
                "PaperClient has no price for pair '{}'. Fetch candles first.",
                order.pair
            ))
        })?;

        let price = self.fill_price(mid, order.side);
        let cost = price * order.volume;
        let fee = cost * self.fee_pct / 100.0;
        let pair = &order.pair;

        let quote = state.balances.get(&pair.quote).copied().unwrap_or(0.0);
        let base = state.balances.get(&pair.base).copied().unwrap_or(0.0);
        let (quote, base) = match order.side {
            OrderSide::Buy => {
                if cost + fee > quote + BALANCE_EPSILON {
                    return Err(Error::InvalidOrder(format!(
                        "insufficient {} balance: need {:.8}, have {quote:.8}",
                        pair.quote,
                        cost + fee
                    )));
                }
                (quote - cost - fee, base + order.volume)
            }
            OrderSide::Sell => {
                if order.volume > base + BALANCE_EPSILON {
                    return Err(Error::InvalidOrder(format!(
                        "insufficient {} balance: need {:.8}, have {base:.8}",
                        pair.base, order.volume
                    )));
                }
                (quote + cost - fee, (base - order.volume).max(0.0))
            }
        };
        state.balances.insert(pair.quote.clone(), quote);
        state.balances.insert(pair.base.clone(), base);

        let now = Utc::now();
        state.orders.insert(
            order.id.clone(),
            OrderDetails {
                id: order.id.clone(),
                pair: pair.clone(),
                side: order.side,
                status: OrderStatus::Closed,
                price,
                volume: order.volume,
                cost,
                fee,
                opened_at: now,
            },
        );

        debug!(
            pair = %pair,
            side = %order.side,
            mid,
            fill = price,
            volume = order.volume,
            fee,
            "Paper fill simulated"
        );

        Ok(Fill {
            order_id: order.id.clone(),
            pair: pair.clone(),
            side: order.side,
            price,
            volume: order.volume,
            fee,
            timestamp: now,
        })
    }

    async fn fetch_order(&self, id: &str, _pair: &Pair) -> Result<OrderDetails> {
        self.state
            .read()
            .await
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Exchange(format!("unknown paper order '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pair() -> Pair {
        Pair::new("ETH", "EUR")
    }

    fn candle(close: f64) -> Candle {
        Candle {
            time: Utc.timestamp_opt(0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[tokio::test]
    async fn paper_buy_fill_applies_positive_slippage() {
        let client = PaperClient::new("EUR", 10_000.0, 10.0, 0.0); // 10 bps
        client.update_price(&pair(), 1000.0).await;

        let order = Order::market(pair(), OrderSide::Buy, 0.01);
        let fill = client.place_order(&order).await.unwrap();

        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        assert!(
            (fill.price - expected).abs() < 1e-6,
            "Buy fill price {}, expected {}",
            fill.price,
            expected
        );
    }

    #[tokio::test]
    async fn paper_sell_fill_applies_negative_slippage() {
        let client = PaperClient::new("EUR", 10_000.0, 10.0, 0.0);
        client.update_price(&pair(), 1000.0).await;

        let buy = Order::market(pair(), OrderSide::Buy, 0.01);
        client.place_order(&buy).await.unwrap();

        let sell = Order::market(pair(), OrderSide::Sell, 0.01);
        let fill = client.place_order(&sell).await.unwrap();

        let expected = 1000.0 * (1.0 - 10.0 / 10_000.0);
        assert!(
            (fill.price - expected).abs() < 1e-6,
            "Sell fill price {}, expected {}",
            fill.price,
            expected
        );
    }

    #[tokio::test]
    async fn paper_balances_move_with_fills_and_fees() {
        let client = PaperClient::new("EUR", 1_000.0, 0.0, 0.4);
        client.update_price(&pair(), 500.0).await;

        let buy = Order::market(pair(), OrderSide::Buy, 1.0);
        let fill = client.place_order(&buy).await.unwrap();
        assert!((fill.fee - 2.0).abs() < 1e-9);

        let balances = client.fetch_balance().await.unwrap();
        assert!((balances["EUR"] - 498.0).abs() < 1e-9);
        assert!((balances["ETH"] - 1.0).abs() < 1e-12);

        let sell = Order::market(pair(), OrderSide::Sell, 1.0);
        client.place_order(&sell).await.unwrap();
        let balances = client.fetch_balance().await.unwrap();
        assert!((balances["EUR"] - 996.0).abs() < 1e-9);
        assert_eq!(balances["ETH"], 0.0);
    }

    #[tokio::test]
    async fn paper_rejects_orders_beyond_balance() {
        let client = PaperClient::new("EUR", 100.0, 0.0, 0.4);
        client.update_price(&pair(), 500.0).await;

        let buy = Order::market(pair(), OrderSide::Buy, 1.0);
        assert!(matches!(client.place_order(&buy).await, Err(Error::InvalidOrder(_))));

        let sell = Order::market(pair(), OrderSide::Sell, 0.1);
        assert!(matches!(client.place_order(&sell).await, Err(Error::InvalidOrder(_))));
    }

    #[tokio::test]
    async fn paper_order_retrievable_by_id() {
        let client = PaperClient::new("EUR", 1_000.0, 0.0, 0.4);
        client.update_price(&pair(), 500.0).await;

        let order = Order::market(pair(), OrderSide::Buy, 1.0);
        let fill = client.place_order(&order).await.unwrap();
        let details = client.fetch_order(&order.id, &pair()).await.unwrap();

        assert_eq!(details.status, OrderStatus::Closed);
        assert_eq!(details.price, fill.price);
        assert_eq!(details.fee, fill.fee);
        assert!(client.fetch_order("nope", &pair()).await.is_err());
    }

    #[tokio::test]
    async fn seeded_candles_set_the_fill_price() {
        let client = PaperClient::new("EUR", 1_000.0, 0.0, 0.0);
        let order = Order::market(pair(), OrderSide::Buy, 0.1);
        assert!(matches!(client.place_order(&order).await, Err(Error::Exchange(_))));

        client.seed_candles(vec![candle(90.0), candle(101.0)]).await;
        let candles = client.fetch_candles(&pair(), 5).await.unwrap();
        assert_eq!(candles.len(), 2);

        let fill = client.place_order(&order).await.unwrap();
        assert_eq!(fill.price, 101.0);
    }

    #[tokio::test]
    async fn upstream_candles_are_passed_through() {
        let upstream = PaperClient::new("EUR", 0.0, 0.0, 0.0);
        upstream.seed_candles(vec![candle(42.0)]).await;

        let client = PaperClient::new("EUR", 1_000.0, 0.0, 0.0).with_upstream(Arc::new(upstream));
        let candles = client.fetch_candles(&pair(), 5).await.unwrap();
        assert_eq!(candles[0].close, 42.0);

        let fill = client
            .place_order(&Order::market(pair(), OrderSide::Buy, 1.0))
            .await
            .unwrap();
        assert_eq!(fill.price, 42.0);
    }
}
