use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use common::{Error, OrderSide, Pair, Result, TradingMode};

/// One executed fill as stored in the `trades` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub order_id: String,
    pub pair: Pair,
    pub side: OrderSide,
    pub price: f64,
    pub volume: f64,
    pub fee: f64,
    /// Realised profit in quote currency. Sells only.
    pub profit: Option<f64>,
    /// `entry` for buys, the exit reason for sells.
    pub reason: String,
    pub mode: TradingMode,
    pub executed_at: DateTime<Utc>,
}

/// Append-only trade history in SQLite.
#[derive(Debug, Clone)]
pub struct TradeJournal {
    db: SqlitePool,
}

impl TradeJournal {
    /// Connect to `database_url` and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = SqlitePool::connect(database_url).await?;
        Self::from_pool(db).await
    }

    pub async fn from_pool(db: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations")
            .run(&db)
            .await
            .map_err(sqlx::Error::from)?;
        info!("Trade journal ready");
        Ok(Self { db })
    }

    /// Insert a fill. Re-recording the same order id is a no-op.
    pub async fn record(&self, trade: &TradeRecord) -> Result<()> {
        let executed_at = trade.executed_at.to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO trades (order_id, pair, side, price, volume, fee, profit, reason, mode, executed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(order_id) DO NOTHING
            "#,
        )
        .bind(&trade.order_id)
        .bind(trade.pair.to_string())
        .bind(trade.side)
        .bind(trade.price)
        .bind(trade.volume)
        .bind(trade.fee)
        .bind(trade.profit)
        .bind(&trade.reason)
        .bind(trade.mode)
        .bind(executed_at)
        .execute(&self.db)
        .await?;

        debug!(order_id = %trade.order_id, side = %trade.side, "Trade journaled");
        Ok(())
    }

    /// Most recent trades for `pair`, newest first.
    pub async fn recent(&self, pair: &Pair, limit: u32) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, pair, side, price, volume, fee, profit, reason, mode, executed_at
            FROM trades
            WHERE pair = ?1
            ORDER BY executed_at DESC
            LIMIT ?2
            "#,
        )
        .bind(pair.to_string())
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    /// Sum of realised profit over all sells of `pair`.
    pub async fn realized_profit(&self, pair: &Pair) -> Result<f64> {
        let total: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(profit), 0.0) FROM trades WHERE pair = ?1 AND side = 'SELL'",
        )
        .bind(pair.to_string())
        .fetch_one(&self.db)
        .await?;
        Ok(total)
    }
}

fn trade_from_row(row: &SqliteRow) -> Result<TradeRecord> {
    let pair: String = row.try_get("pair")?;
    let executed_at: String = row.try_get("executed_at")?;
    let executed_at = DateTime::parse_from_rfc3339(&executed_at)
        .map_err(|e| Error::Other(format!("bad executed_at '{executed_at}': {e}")))?
        .with_timezone(&Utc);

    Ok(TradeRecord {
        order_id: row.try_get("order_id")?,
        pair: pair.parse()?,
        side: row.try_get("side")?,
        price: row.try_get("price")?,
        volume: row.try_get("volume")?,
        fee: row.try_get("fee")?,
        profit: row.try_get("profit")?,
        reason: row.try_get("reason")?,
        mode: row.try_get("mode")?,
        executed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn journal() -> TradeJournal {
        // One connection: every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        TradeJournal::from_pool(pool).await.unwrap()
    }

    fn trade(id: &str, side: OrderSide, profit: Option<f64>, minutes_ago: i64) -> TradeRecord {
        TradeRecord {
            order_id: id.into(),
            pair: Pair::new("ETH", "EUR"),
            side,
            price: 2_000.0,
            volume: 0.05,
            fee: 0.4,
            profit,
            reason: (if side == OrderSide::Buy { "entry" } else { "take_profit" }).into(),
            mode: TradingMode::Paper,
            executed_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn records_and_reads_back_newest_first() {
        let journal = journal().await;
        journal.record(&trade("b1", OrderSide::Buy, None, 30)).await.unwrap();
        journal.record(&trade("s1", OrderSide::Sell, Some(1.25), 5)).await.unwrap();

        let recent = journal.recent(&Pair::new("ETH", "EUR"), 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].order_id, "s1");
        assert_eq!(recent[0].side, OrderSide::Sell);
        assert_eq!(recent[0].profit, Some(1.25));
        assert_eq!(recent[1].reason, "entry");
        assert_eq!(recent[1].mode, TradingMode::Paper);
    }

    #[tokio::test]
    async fn duplicate_order_id_is_ignored() {
        let journal = journal().await;
        let t = trade("b1", OrderSide::Buy, None, 0);
        journal.record(&t).await.unwrap();
        journal.record(&t).await.unwrap();
        assert_eq!(journal.recent(&t.pair, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn realized_profit_sums_sells_only() {
        let journal = journal().await;
        journal.record(&trade("b1", OrderSide::Buy, None, 20)).await.unwrap();
        journal.record(&trade("s1", OrderSide::Sell, Some(1.5), 10)).await.unwrap();
        journal.record(&trade("s2", OrderSide::Sell, Some(-0.5), 0)).await.unwrap();

        let total = journal.realized_profit(&Pair::new("ETH", "EUR")).await.unwrap();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(journal.realized_profit(&Pair::new("BTC", "EUR")).await.unwrap(), 0.0);
    }
}
