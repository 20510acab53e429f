use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::patterns::PatternConfig;

/// Tunable parameters of the scoring engine. Every field has a default, so a
/// TOML `[scoring]` table only needs the values it overrides.
///
/// ```toml
/// [scoring]
/// buy_threshold = 5
/// sell_threshold = 5
///
/// [scoring.weights.breakout]
/// level_break = 2
/// star = 3
///
/// [scoring.patterns.dark_cloud_cover]
/// penetration = 0.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Breakout score at or above which the engine says BUY.
    pub buy_threshold: u32,
    /// Breakdown score at or above which the engine says SELL.
    pub sell_threshold: u32,
    pub weights: Weights,
    pub momentum: MomentumConfig,
    /// How close to a level (fraction of price) counts as "at" it. Also the
    /// proximity filter for significant support/resistance.
    pub level_proximity: f64,
    /// Base flat band for trend classification.
    pub trend_flat_threshold: f64,
    pub windows: Windows,
    pub patterns: PatternConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            buy_threshold: 5,
            sell_threshold: 5,
            weights: Weights::default(),
            momentum: MomentumConfig::default(),
            level_proximity: 0.02,
            trend_flat_threshold: 0.003,
            windows: Windows::default(),
            patterns: PatternConfig::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buy_threshold == 0 || self.sell_threshold == 0 {
            return Err(Error::Config("score thresholds must be at least 1".into()));
        }
        if !(self.level_proximity > 0.0 && self.level_proximity < 1.0) {
            return Err(Error::Config(format!(
                "level_proximity must be in (0, 1), got {}",
                self.level_proximity
            )));
        }
        if self.trend_flat_threshold <= 0.0 {
            return Err(Error::Config("trend_flat_threshold must be positive".into()));
        }
        self.windows.validate()?;
        for slot in [self.patterns.dark_cloud_cover, self.patterns.piercing]
            .into_iter()
            .flatten()
        {
            if !(slot.penetration > 0.0 && slot.penetration < 1.0) {
                return Err(Error::Config(format!(
                    "pattern penetration must be in (0, 1), got {}",
                    slot.penetration
                )));
            }
        }
        Ok(())
    }
}

/// Points added per rule. Unsigned, so a negative weight fails to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub breakout: BreakoutWeights,
    pub breakdown: BreakdownWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutWeights {
    /// Close above key resistance.
    pub level_break: u32,
    /// Bullish engulfing or piercing just above support.
    pub engulfing_near_level: u32,
    /// Bullish engulfing or piercing anywhere else.
    pub engulfing: u32,
    /// Bullish hammer whose previous candle dipped under support.
    pub hammer: u32,
    /// Morning star crossing support.
    pub star: u32,
    /// Uptrend with strong-uptrend volume.
    pub trend_confluence: u32,
    pub rsi_momentum: u32,
    pub rsi_strong_momentum: u32,
    /// Strong rising close regression.
    pub regression: u32,
    /// Close above a valid resistance trendline.
    pub trendline_break: u32,
    pub volume_rising: u32,
}

impl Default for BreakoutWeights {
    fn default() -> Self {
        Self {
            level_break: 2,
            engulfing_near_level: 2,
            engulfing: 1,
            hammer: 2,
            star: 3,
            trend_confluence: 1,
            rsi_momentum: 1,
            rsi_strong_momentum: 1,
            regression: 1,
            trendline_break: 2,
            volume_rising: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakdownWeights {
    /// Close below key support.
    pub level_break: u32,
    /// Bearish engulfing or dark cloud cover just under resistance.
    pub engulfing_near_level: u32,
    /// Bearish engulfing or dark cloud cover anywhere else.
    pub engulfing: u32,
    /// Bearish shooting star whose high poked through resistance.
    pub shooting_star: u32,
    pub star: u32,
    /// Downtrend with strong-downtrend volume.
    pub trend_confluence: u32,
    pub rsi_momentum: u32,
    pub rsi_strong_momentum: u32,
    /// Strong falling close regression.
    pub regression: u32,
    /// Close below a valid support trendline.
    pub trendline_break: u32,
    pub volume_rising: u32,
}

impl Default for BreakdownWeights {
    fn default() -> Self {
        Self {
            level_break: 2,
            engulfing_near_level: 2,
            engulfing: 1,
            shooting_star: 2,
            star: 2,
            trend_confluence: 1,
            rsi_momentum: 1,
            rsi_strong_momentum: 1,
            regression: 1,
            trendline_break: 2,
            volume_rising: 1,
        }
    }
}

/// RSI level and one-cycle change required by the momentum rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiTrigger {
    pub level: f64,
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    /// RSI above `level` and up more than `change` since the previous candle.
    pub bullish: RsiTrigger,
    pub strong_bullish: RsiTrigger,
    /// RSI below `level` and down more than `change`.
    pub bearish: RsiTrigger,
    pub strong_bearish: RsiTrigger,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            bullish: RsiTrigger { level: 52.0, change: 2.0 },
            strong_bullish: RsiTrigger { level: 55.0, change: 5.0 },
            bearish: RsiTrigger { level: 48.0, change: 2.0 },
            strong_bearish: RsiTrigger { level: 45.0, change: 5.0 },
        }
    }
}

/// Trailing window sizes, in closed candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Windows {
    pub levels: usize,
    pub trend: usize,
    pub divergence: usize,
    pub volume_rising: usize,
    pub regression: usize,
    pub rsi_period: usize,
    pub pivot_count: usize,
    pub pivot_strictness: usize,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            levels: 20,
            trend: 30,
            divergence: 10,
            volume_rising: 4,
            regression: 15,
            rsi_period: 14,
            pivot_count: 3,
            pivot_strictness: 2,
        }
    }
}

impl Windows {
    /// Closed candles needed for one evaluation: the structural minimum of 10
    /// and one more than the RSI period so the previous RSI exists.
    pub fn min_closed_candles(&self) -> usize {
        (self.rsi_period + 1).max(10)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("levels", self.levels),
            ("trend", self.trend),
            ("divergence", self.divergence),
        ] {
            if value < 10 {
                return Err(Error::Config(format!(
                    "windows.{name} must be at least 10, got {value}"
                )));
            }
        }
        if self.volume_rising == 0 || self.pivot_count == 0 || self.pivot_strictness == 0 {
            return Err(Error::Config(
                "windows.volume_rising, pivot_count and pivot_strictness must be positive".into(),
            ));
        }
        if self.regression < 2 {
            return Err(Error::Config("windows.regression must be at least 2".into()));
        }
        if self.rsi_period < 2 {
            return Err(Error::Config("windows.rsi_period must be at least 2".into()));
        }
        Ok(())
    }
}
