use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info, info_span, warn, Instrument};

use common::{
    Balances, Decision, Error, ExchangeClient, Order, OrderSide, Pair, Position, Result,
    TradingMode,
};
use ledger::Ledger;
use risk::{ExitPolicy, ExitReason, SizingConfig};
use strategy::{PositionState, ScoringEngine};

use crate::executor::OrderExecutor;
use crate::journal::{TradeJournal, TradeRecord};
use crate::rate_limit::{RateLimitedClient, RateLimiter};
use crate::retry::RetryPolicy;
use crate::settings::BotFileConfig;

/// Journal reason for buys.
const ENTRY_REASON: &str = "entry";
/// Journal reason for positions dropped because their base balance is gone.
const WRITE_OFF_REASON: &str = "written_off";

/// Everything that belongs to one traded pair.
pub struct PairContext {
    pub pair: Pair,
    pub candle_interval_minutes: u32,
    pub ledger: Ledger,
    /// Shared by every trader on the same exchange connection.
    pub limiter: Arc<RateLimiter>,
}

/// Sleep between cycles, drawn uniformly from `[min_minutes, max_minutes]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub min_minutes: u64,
    pub max_minutes: u64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            min_minutes: 5,
            max_minutes: 8,
        }
    }
}

impl Schedule {
    pub fn next_delay(&self) -> Duration {
        let secs = rand::thread_rng().gen_range(self.min_minutes * 60..=self.max_minutes * 60);
        Duration::from_secs(secs)
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Engine output before gating.
    pub signal: Decision,
    /// Decision acted on.
    pub decision: Decision,
    /// State at the start of the cycle.
    pub state: PositionState,
    pub bought: Option<Position>,
    /// Ids of positions sold, with why.
    pub sold: Vec<(String, ExitReason)>,
    /// Ids of positions removed without an order.
    pub written_off: Vec<String>,
}

/// Decision loop for a single pair.
pub struct Trader {
    ctx: PairContext,
    client: Arc<dyn ExchangeClient>,
    engine: ScoringEngine,
    executor: OrderExecutor,
    journal: Option<TradeJournal>,
    mode: TradingMode,
    exit: ExitPolicy,
    sizing: SizingConfig,
    retry: RetryPolicy,
    schedule: Schedule,
    /// Consecutive cycles with open positions and no base balance.
    stranded_cycles: AtomicU32,
}

impl Trader {
    /// `client` is wrapped with the context's rate limiter; the trader never
    /// talks to it directly.
    pub fn new(
        ctx: PairContext,
        client: Arc<dyn ExchangeClient>,
        journal: Option<TradeJournal>,
        settings: &BotFileConfig,
        mode: TradingMode,
    ) -> Self {
        let client: Arc<dyn ExchangeClient> =
            Arc::new(RateLimitedClient::new(client, ctx.limiter.clone()));
        let executor =
            OrderExecutor::new(client.clone(), journal.clone(), settings.retry.clone(), mode);
        Self {
            ctx,
            client,
            engine: ScoringEngine::new(settings.scoring.clone()),
            executor,
            journal,
            mode,
            exit: settings.exit.clone(),
            sizing: settings.sizing.clone(),
            retry: settings.retry.clone(),
            schedule: settings.trading.schedule(),
            stranded_cycles: AtomicU32::new(0),
        }
    }

    pub fn context(&self) -> &PairContext {
        &self.ctx
    }

    /// Run cycles forever. Call from `tokio::spawn`.
    pub async fn run(self) {
        info!(pair = %self.ctx.pair, "Trader running");
        loop {
            let at = Utc::now();
            let span = info_span!("cycle", pair = %self.ctx.pair, at = %at.to_rfc3339());

            match self.run_cycle().instrument(span.clone()).await {
                Ok(report) => span.in_scope(|| {
                    info!(
                        signal = %report.signal,
                        decision = %report.decision,
                        state = %report.state,
                        bought = report.bought.is_some(),
                        sold = report.sold.len(),
                        written_off = report.written_off.len(),
                        "Cycle complete"
                    )
                }),
                Err(e) => span.in_scope(|| error!(error = %e, "Cycle failed")),
            }

            let delay = self.schedule.next_delay();
            info!(pair = %self.ctx.pair, next_in_secs = delay.as_secs(), "Next cycle scheduled");
            tokio::time::sleep(delay).await;
        }
    }

    /// One pass: fetch, evaluate, gate on the ledger, act.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let pair = &self.ctx.pair;

        let candles = self
            .retry
            .run("fetch_candles", || {
                self.client.fetch_candles(pair, self.ctx.candle_interval_minutes)
            })
            .await?;

        let signal = match self.engine.evaluate(&candles) {
            Ok(evaluation) => {
                info!(
                    breakout = evaluation.score.breakout,
                    breakdown = evaluation.score.breakdown,
                    signal = %evaluation.decision,
                    "Market evaluated"
                );
                evaluation.decision
            }
            Err(e) if e.is_precondition() => {
                warn!(error = %e, "Not enough market data, holding");
                Decision::Hold
            }
            Err(e) => return Err(e),
        };

        let balances = self.retry.run("fetch_balance", || self.client.fetch_balance()).await?;

        let mut positions = self.with_ledger(|ledger| Ok(ledger.all())).await?;
        let written_off = self.write_off_stranded(&positions, &balances).await?;
        if !written_off.is_empty() {
            positions.retain(|p| !written_off.contains(&p.id));
        }
        let state = PositionState::from_open_positions(positions.len());
        let decision = state.gate(signal);

        let mut report = CycleReport {
            signal,
            decision,
            state,
            bought: None,
            sold: Vec::new(),
            written_off,
        };

        let Some(price) = candles.last().map(|c| c.close) else {
            warn!("No candles returned, nothing to act on");
            return Ok(report);
        };

        match decision {
            Decision::Buy => {
                report.bought = self.buy(price, &balances).await?;
            }
            Decision::Sell => {
                let targets = positions.into_iter().map(|p| (p, ExitReason::Signal)).collect();
                report.sold = self.sell(targets, price, &balances).await;
            }
            Decision::Hold => {
                let ctx = self.exit.context(price, &candles, Utc::now());
                let exit = self.exit.clone();
                let eligible = self
                    .with_ledger(move |ledger| {
                        Ok(ledger.get_orders(|p| exit.exit_reason(p, &ctx).is_some()))
                    })
                    .await?;
                let targets: Vec<(Position, ExitReason)> = eligible
                    .into_iter()
                    .filter_map(|p| self.exit.exit_reason(&p, &ctx).map(|reason| (p, reason)))
                    .collect();
                if !targets.is_empty() {
                    info!(count = targets.len(), price, "Positions eligible for exit");
                }
                report.sold = self.sell(targets, price, &balances).await;
            }
        }

        if !report.sold.is_empty() || !report.written_off.is_empty() {
            self.log_realized_profit().await;
        }
        Ok(report)
    }

    async fn buy(&self, price: f64, balances: &Balances) -> Result<Option<Position>> {
        let pair = &self.ctx.pair;
        let quote_balance = balances.get(&pair.quote).copied().unwrap_or(0.0);
        let Some(volume) = self.sizing.buy_volume(quote_balance, price) else {
            info!(quote_balance, price, "Balance too small for a buy, holding");
            return Ok(None);
        };

        let order = Order::market(pair.clone(), OrderSide::Buy, volume);
        let execution = self.executor.execute(&order, ENTRY_REASON, None).await?;

        let position = self
            .with_ledger(move |ledger| {
                ledger.add_order(
                    execution.order_id,
                    execution.price,
                    execution.volume,
                    execution.cost + execution.fee,
                    Some(execution.executed_at),
                )
            })
            .await?;
        Ok(Some(position))
    }

    /// Sell each target in turn. A failed sell is logged and the position stays
    /// in the ledger for the next cycle.
    async fn sell(
        &self,
        targets: Vec<(Position, ExitReason)>,
        price: f64,
        balances: &Balances,
    ) -> Vec<(String, ExitReason)> {
        let pair = &self.ctx.pair;
        let mut base_balance = balances.get(&pair.base).copied().unwrap_or(0.0);
        let mut sold = Vec::new();

        for (position, reason) in targets {
            let Some(volume) = self.sizing.sell_volume(position.volume, base_balance, price) else {
                warn!(id = %position.id, base_balance, "No base balance to sell position");
                continue;
            };

            let order = Order::market(pair.clone(), OrderSide::Sell, volume);
            let execution = match self
                .executor
                .execute(&order, &reason.to_string(), Some(position.cost))
                .await
            {
                Ok(execution) => execution,
                Err(e) => {
                    error!(id = %position.id, reason = %reason, error = %e, "Sell failed, position kept");
                    continue;
                }
            };
            base_balance = (base_balance - execution.volume).max(0.0);

            let id = position.id.clone();
            if let Err(e) = self.with_ledger(move |ledger| ledger.remove_orders([id])).await {
                error!(id = %position.id, error = %e, "Sold position could not be removed from ledger");
            }
            info!(id = %position.id, reason = %reason, price = execution.price, "Position closed");
            sold.push((position.id, reason));
        }
        sold
    }

    /// Drop every open position once the base balance has been empty for
    /// `stranded_after_cycles` consecutive cycles. Each write-off is journaled
    /// as a sell at the entry price that lost the whole entry cost.
    async fn write_off_stranded(
        &self,
        positions: &[Position],
        balances: &Balances,
    ) -> Result<Vec<String>> {
        let base_balance = balances.get(&self.ctx.pair.base).copied().unwrap_or(0.0);
        if positions.is_empty() || base_balance > 0.0 {
            self.stranded_cycles.store(0, Ordering::SeqCst);
            return Ok(Vec::new());
        }

        let cycles = self.stranded_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        if cycles < self.exit.stranded_after_cycles {
            warn!(
                positions = positions.len(),
                cycles,
                limit = self.exit.stranded_after_cycles,
                "Ledger holds positions but the base balance is empty"
            );
            return Ok(Vec::new());
        }

        let ids: Vec<String> = positions.iter().map(|p| p.id.clone()).collect();
        let remove = ids.clone();
        self.with_ledger(move |ledger| ledger.remove_orders(remove)).await?;
        self.stranded_cycles.store(0, Ordering::SeqCst);

        for position in positions {
            error!(id = %position.id, cost = position.cost, cycles, "Stranded position written off");
            let Some(journal) = &self.journal else {
                continue;
            };
            let record = TradeRecord {
                order_id: format!("{}-write-off", position.id),
                pair: self.ctx.pair.clone(),
                side: OrderSide::Sell,
                price: position.price,
                volume: position.volume,
                fee: 0.0,
                profit: Some(-position.cost),
                reason: WRITE_OFF_REASON.to_string(),
                mode: self.mode,
                executed_at: Utc::now(),
            };
            if let Err(e) = journal.record(&record).await {
                error!(id = %position.id, error = %e, "Failed to journal write-off");
            }
        }
        Ok(ids)
    }

    async fn log_realized_profit(&self) {
        let Some(journal) = &self.journal else {
            return;
        };
        match journal.realized_profit(&self.ctx.pair).await {
            Ok(total) => info!(pair = %self.ctx.pair, realized_profit = total, "Realised profit to date"),
            Err(e) => warn!(error = %e, "Could not read realised profit"),
        }
    }

    /// Run a ledger operation on the blocking pool; the ledger does
    /// synchronous file I/O.
    async fn with_ledger<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Ledger) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = self.ctx.ledger.clone();
        tokio::task::spawn_blocking(move || op(ledger))
            .await
            .map_err(|e| Error::Other(format!("ledger task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let schedule = Schedule::default();
        for _ in 0..200 {
            let delay = schedule.next_delay();
            assert!(delay >= Duration::from_secs(5 * 60));
            assert!(delay <= Duration::from_secs(8 * 60));
        }
    }

    #[test]
    fn degenerate_range_is_fixed() {
        let schedule = Schedule {
            min_minutes: 6,
            max_minutes: 6,
        };
        assert_eq!(schedule.next_delay(), Duration::from_secs(360));
    }
}
