use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use common::{Candle, Error, Position, Result};
use strategy::indicators::percentage_change;

/// Why a position is being sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The scoring engine said SELL.
    Signal,
    TakeProfit,
    StopLoss,
    /// Held past the backlog age.
    Aged,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::Aged => write!(f, "aged"),
        }
    }
}

/// Liquidation rule for positions that have been open too long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogPolicy {
    /// Age after which a position is force-considered for exit.
    pub max_age_hours: i64,
    /// Window for the recent-high check.
    pub lookback_hours: i64,
    /// Only liquidate aged positions while price sits at or above the
    /// highest close of the lookback window.
    pub require_recent_high: bool,
}

impl Default for BacklogPolicy {
    fn default() -> Self {
        Self {
            max_age_hours: 96,
            lookback_hours: 4,
            require_recent_high: true,
        }
    }
}

/// When open positions become sellable outside a SELL decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    /// Percent gain over the entry price that makes a position exit-eligible.
    pub take_profit_pct: f64,
    /// Percent loss that forces an exit. Disabled when absent.
    pub stop_loss_pct: Option<f64>,
    /// Disabled when absent.
    pub backlog: Option<BacklogPolicy>,
    /// Consecutive cycles the ledger may hold positions while the base
    /// balance is empty before those positions are written off.
    pub stranded_after_cycles: u32,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            take_profit_pct: 1.4,
            stop_loss_pct: None,
            backlog: Some(BacklogPolicy::default()),
            stranded_after_cycles: 3,
        }
    }
}

/// Price context an exit check runs against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitContext {
    pub price: f64,
    pub now: DateTime<Utc>,
    /// Highest close inside the backlog lookback window, if any candle falls in it.
    pub recent_high: Option<f64>,
}

impl ExitPolicy {
    pub fn validate(&self) -> Result<()> {
        if !(self.take_profit_pct > 0.0) {
            return Err(Error::Config(format!(
                "exit.take_profit_pct must be positive, got {}",
                self.take_profit_pct
            )));
        }
        if let Some(sl) = self.stop_loss_pct {
            if !(sl > 0.0 && sl < 100.0) {
                return Err(Error::Config(format!(
                    "exit.stop_loss_pct must be in (0, 100), got {sl}"
                )));
            }
        }
        if self.stranded_after_cycles == 0 {
            return Err(Error::Config(
                "exit.stranded_after_cycles must be at least 1".into(),
            ));
        }
        if let Some(backlog) = &self.backlog {
            if backlog.max_age_hours <= 0 || backlog.lookback_hours <= 0 {
                return Err(Error::Config(
                    "exit.backlog hours must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    /// Build the exit context for `price` from the candles just fetched.
    pub fn context(&self, price: f64, candles: &[Candle], now: DateTime<Utc>) -> ExitContext {
        let recent_high = self.backlog.as_ref().and_then(|b| {
            let since = now - Duration::hours(b.lookback_hours);
            candles
                .iter()
                .filter(|c| c.time >= since)
                .map(|c| c.close)
                .reduce(f64::max)
        });
        ExitContext {
            price,
            now,
            recent_high,
        }
    }

    /// First matching reason in order: take-profit, stop-loss, aged.
    pub fn exit_reason(&self, position: &Position, ctx: &ExitContext) -> Option<ExitReason> {
        let change = percentage_change(ctx.price, position.price);

        if change >= self.take_profit_pct {
            return Some(ExitReason::TakeProfit);
        }
        if self.stop_loss_pct.is_some_and(|sl| change <= -sl) {
            return Some(ExitReason::StopLoss);
        }
        if let Some(backlog) = &self.backlog {
            let aged = ctx.now - position.time_stamp >= Duration::hours(backlog.max_age_hours);
            let at_high = !backlog.require_recent_high
                || ctx.recent_high.is_some_and(|high| ctx.price >= high);
            if aged && at_high {
                return Some(ExitReason::Aged);
            }
        }
        None
    }
}
