use serde::Serialize;
use tracing::debug;

use common::{Candle, Decision, Error, Result};

use crate::config::ScoringConfig;
use crate::indicators::{linear_regression, Regression, RsiIndicator, Strength, Trend};
use crate::patterns::{
    detect_trend, detect_trendlines, detect_volume_divergence, find_support_resistance,
    is_trendline_valid, is_volume_rising, CandlePattern, CandlestickDetector, Levels, Trendlines,
    VolumeDivergence,
};

/// Accumulated evidence for each direction. Reset every evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub breakout: u32,
    pub breakdown: u32,
}

/// Every input the scoring rules read, computed from one closed-candle window.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSignals {
    pub last: Candle,
    pub prev: Candle,
    pub levels: Levels,
    pub pattern: CandlePattern,
    pub trend: Trend,
    pub divergence: VolumeDivergence,
    pub volume_rising: bool,
    pub close_regression: Regression,
    pub trendlines: Trendlines,
    pub valid_resistance_line: bool,
    pub valid_support_line: bool,
    pub rsi: f64,
    /// RSI of the same window without its last candle.
    pub prev_rsi: f64,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub score: Score,
    pub signals: MarketSignals,
}

/// Turns a candle window into a BUY / SELL / HOLD decision.
///
/// Stateless between calls: the previous RSI is recomputed from the window.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    detector: CandlestickDetector,
    rsi: RsiIndicator,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        let detector = CandlestickDetector::new(config.patterns.clone());
        let rsi = RsiIndicator::new(config.windows.rsi_period);
        Self {
            config,
            detector,
            rsi,
        }
    }

    /// Evaluate a freshly fetched window. The last candle is still forming
    /// and is discarded before analysis.
    pub fn evaluate(&self, candles: &[Candle]) -> Result<Evaluation> {
        let closed = match candles.split_last() {
            Some((_, closed)) => closed,
            None => {
                return Err(Error::InsufficientData {
                    needed: self.config.windows.min_closed_candles() + 1,
                    got: 0,
                })
            }
        };
        let signals = self.signals(closed)?;
        let score = self.score(&signals);
        let decision = self.decide(score);

        debug!(
            breakout = score.breakout,
            breakdown = score.breakdown,
            pattern = %signals.pattern,
            trend = %signals.trend,
            rsi = signals.rsi,
            prev_rsi = signals.prev_rsi,
            decision = %decision,
            "Market scored"
        );

        Ok(Evaluation {
            decision,
            score,
            signals,
        })
    }

    /// Compute every signal over a window of closed candles.
    pub fn signals(&self, closed: &[Candle]) -> Result<MarketSignals> {
        let w = &self.config.windows;
        let needed = w.min_closed_candles();
        if closed.len() < needed {
            return Err(Error::InsufficientData {
                needed,
                got: closed.len(),
            });
        }

        let n = closed.len();
        let last = closed[n - 1];
        let prev = closed[n - 2];
        let closes: Vec<f64> = closed.iter().map(|c| c.close).collect();

        let levels = find_support_resistance(tail(closed, w.levels), self.config.level_proximity)?;
        let pattern = self.detector.detect(closed)?;
        let trend = detect_trend(tail(closed, w.trend), self.config.trend_flat_threshold)?;
        let divergence = detect_volume_divergence(tail(closed, w.divergence))?;
        let volume_rising = is_volume_rising(tail(closed, w.volume_rising));
        let close_regression = linear_regression(tail(&closes, w.regression));

        let trendlines = detect_trendlines(closed, w.pivot_count, w.pivot_strictness);
        let valid_resistance_line = is_trendline_valid(&trendlines.resistance_prices());
        let valid_support_line = is_trendline_valid(&trendlines.support_prices());

        let rsi = self.rsi.compute(&closes)?;
        let prev_rsi = self.rsi.compute(&closes[..n - 1])?;

        Ok(MarketSignals {
            last,
            prev,
            levels,
            pattern,
            trend,
            divergence,
            volume_rising,
            close_regression,
            trendlines,
            valid_resistance_line,
            valid_support_line,
            rsi,
            prev_rsi,
        })
    }

    /// Apply the weighted rules. Each rule only ever adds its weight.
    pub fn score(&self, s: &MarketSignals) -> Score {
        let mut score = Score::default();
        let close = s.last.close;
        let support = s.levels.key_support();
        let resistance = s.levels.key_resistance();
        let near = self.config.level_proximity;
        let m = &self.config.momentum;
        let rsi_change = s.rsi - s.prev_rsi;

        // ─── Breakout ─────────────────────────────────────────────────────────
        let up = &self.config.weights.breakout;

        if resistance.is_some_and(|r| close > r) {
            score.breakout += up.level_break;
        }
        if matches!(s.pattern, CandlePattern::BullishEngulfing | CandlePattern::Piercing) {
            let at_support = support.is_some_and(|sup| close > sup && close < sup * (1.0 + near));
            score.breakout += if at_support {
                up.engulfing_near_level
            } else {
                up.engulfing
            };
        }
        if s.pattern == CandlePattern::Hammer
            && s.last.is_bullish()
            && support.is_some_and(|sup| s.prev.low < sup)
        {
            score.breakout += up.hammer;
        }
        if s.pattern == CandlePattern::MorningStar
            && support.is_some_and(|sup| s.prev.close < sup && close > sup)
        {
            score.breakout += up.star;
        }
        if s.trend == Trend::Uptrend && s.divergence == VolumeDivergence::StrongUptrend {
            score.breakout += up.trend_confluence;
        }
        if s.rsi > m.bullish.level && rsi_change > m.bullish.change {
            score.breakout += up.rsi_momentum;
        }
        if s.rsi > m.strong_bullish.level && rsi_change > m.strong_bullish.change {
            score.breakout += up.rsi_strong_momentum;
        }
        if s.close_regression.strength == Strength::Strong && s.close_regression.slope > 0.0 {
            score.breakout += up.regression;
        }
        if s.valid_resistance_line
            && max_price(&s.trendlines.resistance_prices()).is_some_and(|top| close > top)
        {
            score.breakout += up.trendline_break;
        }

        // ─── Breakdown ────────────────────────────────────────────────────────
        let down = &self.config.weights.breakdown;

        if support.is_some_and(|sup| close < sup) {
            score.breakdown += down.level_break;
        }
        if matches!(s.pattern, CandlePattern::BearishEngulfing | CandlePattern::DarkCloudCover) {
            let at_resistance =
                resistance.is_some_and(|r| close < r && close > r * (1.0 - near));
            score.breakdown += if at_resistance {
                down.engulfing_near_level
            } else {
                down.engulfing
            };
        }
        if s.pattern == CandlePattern::ShootingStar
            && s.last.is_bearish()
            && resistance.is_some_and(|r| s.last.high > r)
        {
            score.breakdown += down.shooting_star;
        }
        if s.pattern == CandlePattern::EveningStar {
            score.breakdown += down.star;
        }
        if s.trend == Trend::Downtrend && s.divergence == VolumeDivergence::StrongDowntrend {
            score.breakdown += down.trend_confluence;
        }
        if s.rsi < m.bearish.level && -rsi_change > m.bearish.change {
            score.breakdown += down.rsi_momentum;
        }
        if s.rsi < m.strong_bearish.level && -rsi_change > m.strong_bearish.change {
            score.breakdown += down.rsi_strong_momentum;
        }
        if s.close_regression.strength == Strength::Strong && s.close_regression.slope < 0.0 {
            score.breakdown += down.regression;
        }
        if s.valid_support_line
            && min_price(&s.trendlines.support_prices()).is_some_and(|bottom| close < bottom)
        {
            score.breakdown += down.trendline_break;
        }

        // Rising participation amplifies whichever side is building.
        if s.volume_rising {
            score.breakout += up.volume_rising;
            score.breakdown += down.volume_rising;
        }

        score
    }

    /// Breakout wins ties with breakdown.
    pub fn decide(&self, score: Score) -> Decision {
        if score.breakout >= self.config.buy_threshold {
            Decision::Buy
        } else if score.breakdown >= self.config.sell_threshold {
            Decision::Sell
        } else {
            Decision::Hold
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

fn tail<T>(items: &[T], len: usize) -> &[T] {
    &items[items.len().saturating_sub(len)..]
}

fn max_price(prices: &[f64]) -> Option<f64> {
    prices.iter().copied().reduce(f64::max)
}

fn min_price(prices: &[f64]) -> Option<f64> {
    prices.iter().copied().reduce(f64::min)
}
