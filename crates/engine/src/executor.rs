use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use common::{Error, ExchangeClient, Fill, Order, OrderDetails, OrderSide, Result, TradingMode};

use crate::journal::{TradeJournal, TradeRecord};
use crate::retry::RetryPolicy;

/// A confirmed fill, with the exchange's own numbers when it reported them.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub order_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub volume: f64,
    /// Quote amount exchanged, fee excluded.
    pub cost: f64,
    pub fee: f64,
    pub executed_at: DateTime<Utc>,
}

impl Execution {
    fn from_details(details: &OrderDetails, fill: &Fill) -> Self {
        Self {
            order_id: details.id.clone(),
            side: details.side,
            price: details.price,
            volume: details.volume,
            cost: details.cost,
            // Some venues omit the fee on order lookups.
            fee: if details.fee > 0.0 { details.fee } else { fill.fee },
            executed_at: details.opened_at,
        }
    }

    fn from_fill(fill: &Fill) -> Self {
        Self {
            order_id: fill.order_id.clone(),
            side: fill.side,
            price: fill.price,
            volume: fill.volume,
            cost: fill.price * fill.volume,
            fee: fill.fee,
            executed_at: fill.timestamp,
        }
    }
}

/// Places orders, confirms them, and journals the result.
///
/// This is the ONLY component that calls `ExchangeClient::place_order`.
/// Submission is never retried; the confirmation lookup is.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    journal: Option<TradeJournal>,
    retry: RetryPolicy,
    mode: TradingMode,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        journal: Option<TradeJournal>,
        retry: RetryPolicy,
        mode: TradingMode,
    ) -> Self {
        Self {
            client,
            journal,
            retry,
            mode,
        }
    }

    /// Submit `order` and wait for the exchange to confirm it.
    ///
    /// `reason` goes to the journal. `entry_cost` is the cost basis of the
    /// position a sell closes, used for realised profit.
    pub async fn execute(&self, order: &Order, reason: &str, entry_cost: Option<f64>) -> Result<Execution> {
        info!(pair = %order.pair, side = %order.side, volume = order.volume, reason, "Executing order");

        let fill = self.client.place_order(order).await.map_err(|e| {
            error!(pair = %order.pair, side = %order.side, error = %e, "Order submission failed");
            e
        })?;

        let execution = match self
            .retry
            .run("fetch_order", || self.client.fetch_order(&fill.order_id, &order.pair))
            .await
        {
            Ok(details) if details.status.is_filled() => Execution::from_details(&details, &fill),
            Ok(details) => {
                return Err(Error::Exchange(format!(
                    "order {} is {}, expected closed",
                    details.id, details.status
                )));
            }
            Err(e) => {
                warn!(order_id = %fill.order_id, error = %e, "Order lookup failed, using submission fill");
                Execution::from_fill(&fill)
            }
        };

        info!(
            order_id = %execution.order_id,
            side = %execution.side,
            price = execution.price,
            volume = execution.volume,
            fee = execution.fee,
            "Order filled"
        );

        let profit = match execution.side {
            OrderSide::Sell => entry_cost.map(|cost| execution.cost - execution.fee - cost),
            OrderSide::Buy => None,
        };
        self.journal(order, &execution, reason, profit).await;

        Ok(execution)
    }

    async fn journal(&self, order: &Order, execution: &Execution, reason: &str, profit: Option<f64>) {
        let Some(journal) = &self.journal else {
            return;
        };
        let record = TradeRecord {
            order_id: execution.order_id.clone(),
            pair: order.pair.clone(),
            side: execution.side,
            price: execution.price,
            volume: execution.volume,
            fee: execution.fee,
            profit,
            reason: reason.to_string(),
            mode: self.mode,
            executed_at: execution.executed_at,
        };
        if let Err(e) = journal.record(&record).await {
            error!(order_id = %execution.order_id, error = %e, "Failed to journal fill");
        }
    }
}
