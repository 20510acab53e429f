pub mod config;
pub mod indicators;
pub mod patterns;
pub mod scoring;
pub mod state;

pub use config::{
    BreakdownWeights, BreakoutWeights, MomentumConfig, RsiTrigger, ScoringConfig, Weights, Windows,
};
pub use scoring::{Evaluation, MarketSignals, Score, ScoringEngine};
pub use state::PositionState;

/// Candle fixtures shared with downstream integration tests.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use common::Candle;

    /// Candle `index` intervals (5 min) after the epoch.
    pub fn ohlcv(index: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            time: Utc.timestamp_opt(0, 0).unwrap() + Duration::minutes(5 * index as i64),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 19 closed candles drifting sideways, then heavy candles testing 100.0
    /// and a bullish engulfing bar off that support; the 20th candle is
    /// still open.
    pub fn engulfing_at_support() -> Vec<Candle> {
        let drift = [
            100.6, 100.9, 100.7, 101.0, 100.8, 101.1, 100.9, 101.2, 101.0, 101.3, 101.1, 101.4,
            101.2, 101.5, 101.3,
        ];
        let mut candles = Vec::with_capacity(20);
        let mut open = 100.5;
        for (i, &close) in drift.iter().enumerate() {
            let high = f64::max(open, close) + 0.05;
            let low = f64::min(open, close) - 0.05;
            candles.push(ohlcv(i as u32, open, high, low, close, 10.0));
            open = close;
        }
        candles.push(ohlcv(15, 101.3, 101.58, 100.0, 101.5, 30.0));
        candles.push(ohlcv(16, 101.6, 101.7, 101.1, 101.2, 32.0));
        candles.push(ohlcv(17, 101.3, 101.35, 100.0, 100.8, 34.0));
        candles.push(ohlcv(18, 100.7, 101.9, 100.0, 101.8, 40.0));
        candles.push(ohlcv(19, 101.8, 102.0, 101.7, 101.9, 5.0));
        candles
    }

    /// Price mirror of [`engulfing_at_support`] around 100.0: a bearish
    /// engulfing bar under resistance at 100.0 with RSI falling through 45.
    /// Volumes are unchanged.
    pub fn engulfing_at_resistance() -> Vec<Candle> {
        let mirror = |price: f64| 200.0 - price;
        engulfing_at_support()
            .into_iter()
            .map(|c| Candle {
                open: mirror(c.open),
                high: mirror(c.low),
                low: mirror(c.high),
                close: mirror(c.close),
                ..c
            })
            .collect()
    }
}
