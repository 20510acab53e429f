use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::{
    Balances, Candle, Error, ExchangeClient, Fill, Order, OrderDetails, OrderSide, OrderStatus,
    Pair, Result,
};

const BASE_URL: &str = "https://api.binance.com";
const KLINE_LIMIT: u32 = 100;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// REST API client for Binance spot. Public klines plus signed account and
/// order endpoints.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, secret, BASE_URL)
    }

    /// Point the client at another host, e.g. the spot testnet.
    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into(),
            http,
        })
    }

    fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn sign(&self, query: &str) -> Result<String> {
        sign(&self.secret, query)
    }

    fn signed_query(&self, params: &str) -> Result<String> {
        let ts = Self::timestamp_ms();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{params}", self.base_url);
        let resp = self.http.get(&url).send().await.map_err(read_error)?;
        body_of(resp).await
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(params)?);
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(read_error)?;
        body_of(resp).await
    }

    /// Network failures here are NOT transient: the order may have landed.
    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(self.signed_query(params)?)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        body_of(resp).await
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn fetch_candles(&self, pair: &Pair, interval_minutes: u32) -> Result<Vec<Candle>> {
        let interval = interval_code(interval_minutes)?;
        let params = format!("symbol={}&interval={interval}&limit={KLINE_LIMIT}", pair.symbol());
        let body = self.public_get("/api/v3/klines", &params).await?;

        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)?;
        let candles = rows.iter().map(|row| parse_kline(row)).collect::<Result<Vec<_>>>()?;
        debug!(pair = %pair, count = candles.len(), "Fetched klines");
        Ok(candles)
    }

    async fn fetch_balance(&self) -> Result<Balances> {
        let body = self.signed_get("/api/v3/account", "").await?;
        let account: AccountResponse = serde_json::from_str(&body)?;

        let mut balances = Balances::new();
        for b in account.balances {
            let free = parse_num(&b.free)?;
            if free > 0.0 {
                balances.insert(b.asset, free);
            }
        }
        Ok(balances)
    }

    async fn place_order(&self, order: &Order) -> Result<Fill> {
        if order.price.is_some() {
            return Err(Error::InvalidOrder("only market orders are supported".into()));
        }
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
            order.pair.symbol(),
            order.side,
            format_quantity(order.volume),
            order.id
        );

        debug!(pair = %order.pair, side = %order.side, "Submitting order to Binance");
        let body = self.signed_post("/api/v3/order", &params).await?;
        let resp: OrderResponse = serde_json::from_str(&body)?;
        resp.into_fill(order)
    }

    async fn fetch_order(&self, id: &str, pair: &Pair) -> Result<OrderDetails> {
        let params = format!("symbol={}&origClientOrderId={id}", pair.symbol());
        let body = self.signed_get("/api/v3/order", &params).await?;
        let resp: QueryOrderResponse = serde_json::from_str(&body)?;
        resp.into_details(pair)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn sign(secret: &str, query: &str) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("invalid Binance secret: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Connection drops and timeouts on reads are worth retrying.
fn read_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::TransientExchange(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    // 418: IP banned after ignoring 429s; both lift with time.
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::IM_A_TEAPOT
        || status.is_server_error()
    {
        Error::TransientExchange(format!("HTTP {status}: {body}"))
    } else {
        Error::Exchange(format!("HTTP {status}: {body}"))
    }
}

async fn body_of(resp: Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(read_error)?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(body)
}

fn interval_code(minutes: u32) -> Result<&'static str> {
    Ok(match minutes {
        1 => "1m",
        3 => "3m",
        5 => "5m",
        15 => "15m",
        30 => "30m",
        60 => "1h",
        120 => "2h",
        240 => "4h",
        360 => "6h",
        480 => "8h",
        720 => "12h",
        1440 => "1d",
        other => {
            return Err(Error::Config(format!(
                "Binance has no {other}-minute kline interval"
            )))
        }
    })
}

fn parse_num(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::Exchange(format!("bad number '{raw}': {e}")))
}

fn millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("bad timestamp {ms}")))
}

/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
fn parse_kline(row: &[serde_json::Value]) -> Result<Candle> {
    let field = |i: usize| -> Result<f64> {
        row.get(i)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Exchange(format!("kline field {i} missing")))
            .and_then(parse_num)
    };
    let open_time = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::Exchange("kline open time missing".into()))?;

    Ok(Candle {
        time: millis(open_time)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

fn map_status(status: &str) -> OrderStatus {
    match status {
        "FILLED" => OrderStatus::Closed,
        "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
        "EXPIRED" | "EXPIRED_IN_MATCH" | "REJECTED" => OrderStatus::Expired,
        _ => OrderStatus::Open,
    }
}

fn map_side(side: &str) -> Result<OrderSide> {
    match side {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(Error::Exchange(format!("unknown order side '{other}'"))),
    }
}

/// Trailing zeros trimmed, at most 8 decimals.
fn format_quantity(volume: f64) -> String {
    let s = format!("{volume:.8}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Average price from executed totals, if anything executed.
fn average_price(quote_qty: f64, executed_qty: f64) -> Option<f64> {
    (executed_qty > 0.0).then(|| quote_qty / executed_qty)
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    client_order_id: String,
    executed_qty: String,
    cummulative_quote_qty: String,
    transact_time: i64,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

impl OrderResponse {
    fn into_fill(self, order: &Order) -> Result<Fill> {
        let volume = parse_num(&self.executed_qty)?;
        let quote = parse_num(&self.cummulative_quote_qty)?;
        let price = match average_price(quote, volume) {
            Some(p) => p,
            None => self
                .fills
                .first()
                .map(|f| parse_num(&f.price))
                .transpose()?
                .unwrap_or(0.0),
        };

        // Commission paid in a third asset (BNB) is not counted.
        let mut fee = 0.0;
        for f in &self.fills {
            let commission = parse_num(&f.commission)?;
            if f.commission_asset == order.pair.quote {
                fee += commission;
            } else if f.commission_asset == order.pair.base {
                fee += commission * price;
            }
        }

        Ok(Fill {
            order_id: self.client_order_id,
            pair: order.pair.clone(),
            side: order.side,
            price,
            volume,
            fee,
            timestamp: millis(self.transact_time)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillDetail {
    price: String,
    commission: String,
    commission_asset: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryOrderResponse {
    client_order_id: String,
    side: String,
    status: String,
    executed_qty: String,
    cummulative_quote_qty: String,
    time: i64,
}

impl QueryOrderResponse {
    fn into_details(self, pair: &Pair) -> Result<OrderDetails> {
        let volume = parse_num(&self.executed_qty)?;
        let cost = parse_num(&self.cummulative_quote_qty)?;
        Ok(OrderDetails {
            id: self.client_order_id,
            pair: pair.clone(),
            side: map_side(&self.side)?,
            status: map_status(&self.status),
            price: average_price(cost, volume).unwrap_or(0.0),
            volume,
            cost,
            // Not reported by this endpoint.
            fee: 0.0,
            opened_at: millis(self.time)?,
        })
    }
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_matches_binance_documentation() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn kline_row_parses() {
        let row = json!([
            1499040000000i64, "0.01634790", "0.80000000", "0.01575800", "0.01577100",
            "148976.11427815", 1499644799999i64, "2434.19055334", 308, "1756.87402397",
            "28.46694368", "0"
        ]);
        let candle = parse_kline(row.as_array().unwrap()).unwrap();
        assert_eq!(candle.time.timestamp_millis(), 1499040000000);
        assert_eq!(candle.open, 0.0163479);
        assert_eq!(candle.close, 0.015771);
        assert_eq!(candle.volume, 148976.11427815);
    }

    #[test]
    fn malformed_kline_is_an_error() {
        let row = json!([1499040000000i64, "0.1", "0.2"]);
        assert!(parse_kline(row.as_array().unwrap()).is_err());
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(status_error(StatusCode::IM_A_TEAPOT, "").is_transient());
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "{\"code\":-1013}").is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "").is_transient());
    }

    #[test]
    fn intervals() {
        assert_eq!(interval_code(5).unwrap(), "5m");
        assert_eq!(interval_code(60).unwrap(), "1h");
        assert!(matches!(interval_code(7), Err(Error::Config(_))));
    }

    #[test]
    fn statuses() {
        assert_eq!(map_status("FILLED"), OrderStatus::Closed);
        assert_eq!(map_status("PARTIALLY_FILLED"), OrderStatus::Open);
        assert_eq!(map_status("CANCELED"), OrderStatus::Canceled);
        assert_eq!(map_status("EXPIRED"), OrderStatus::Expired);
    }

    #[test]
    fn quantity_formatting() {
        assert_eq!(format_quantity(0.05), "0.05");
        assert_eq!(format_quantity(1.0), "1");
        assert_eq!(format_quantity(0.123456789), "0.12345679");
    }

    #[test]
    fn full_order_response_becomes_fill() {
        let order = Order::market(Pair::new("ETH", "EUR"), OrderSide::Buy, 0.05);
        let resp: OrderResponse = serde_json::from_value(json!({
            "symbol": "ETHEUR",
            "orderId": 28,
            "clientOrderId": order.id,
            "transactTime": 1507725176595i64,
            "executedQty": "0.05000000",
            "cummulativeQuoteQty": "100.50000000",
            "status": "FILLED",
            "fills": [
                { "price": "2000.00", "qty": "0.03", "commission": "0.24", "commissionAsset": "EUR" },
                { "price": "2025.00", "qty": "0.02", "commission": "0.00008", "commissionAsset": "ETH" }
            ]
        }))
        .unwrap();

        let fill = resp.into_fill(&order).unwrap();
        assert_eq!(fill.order_id, order.id);
        assert!((fill.price - 2_010.0).abs() < 1e-9);
        assert!((fill.volume - 0.05).abs() < 1e-12);
        assert!((fill.fee - (0.24 + 0.00008 * 2_010.0)).abs() < 1e-9);
    }

    #[test]
    fn query_order_response_becomes_details() {
        let pair = Pair::new("ETH", "EUR");
        let resp: QueryOrderResponse = serde_json::from_value(json!({
            "symbol": "ETHEUR",
            "clientOrderId": "abc",
            "side": "SELL",
            "status": "FILLED",
            "executedQty": "0.5",
            "cummulativeQuoteQty": "1000.0",
            "time": 1507725176595i64
        }))
        .unwrap();

        let details = resp.into_details(&pair).unwrap();
        assert_eq!(details.side, OrderSide::Sell);
        assert!(details.status.is_filled());
        assert_eq!(details.price, 2_000.0);
        assert_eq!(details.cost, 1_000.0);
    }
}
