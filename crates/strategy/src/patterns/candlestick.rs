use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

/// Classification of the last three candles of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandlePattern {
    MorningStar,
    EveningStar,
    BullishEngulfing,
    BearishEngulfing,
    DarkCloudCover,
    Piercing,
    ShootingStar,
    Hammer,
    InvertedHammer,
    Doji,
    None,
}

impl std::fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CandlePattern::MorningStar => "morning-star",
            CandlePattern::EveningStar => "evening-star",
            CandlePattern::BullishEngulfing => "bullish-engulfing",
            CandlePattern::BearishEngulfing => "bearish-engulfing",
            CandlePattern::DarkCloudCover => "dark-cloud-cover",
            CandlePattern::Piercing => "piercing",
            CandlePattern::ShootingStar => "shooting-star",
            CandlePattern::Hammer => "hammer",
            CandlePattern::InvertedHammer => "inverted-hammer",
            CandlePattern::Doji => "doji",
            CandlePattern::None => "none",
        };
        f.write_str(name)
    }
}

/// Body and wick measurements of a single candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleMetrics {
    pub body_size: f64,
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub total_range: f64,
}

impl CandleMetrics {
    pub fn of(candle: &Candle) -> Self {
        Self {
            body_size: (candle.close - candle.open).abs(),
            upper_wick: candle.high - candle.close.max(candle.open),
            lower_wick: candle.close.min(candle.open) - candle.low,
            total_range: candle.high - candle.low,
        }
    }
}

/// Geometry for a two-candle penetration pattern (dark cloud cover, piercing).
///
/// The second candle must close at least `penetration` of the way into the
/// first candle's body without closing past it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenetrationSlot {
    /// Fraction of the first body, in `(0, 1)`. `0.5` is the classic midpoint rule.
    pub penetration: f64,
    /// Require the second candle to open beyond the first candle's close.
    #[serde(default)]
    pub require_gap: bool,
}

/// Optional pattern definitions. Both slots are disabled unless configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub dark_cloud_cover: Option<PenetrationSlot>,
    pub piercing: Option<PenetrationSlot>,
}

/// Classifies the last three candles of a window, first match wins in
/// significance order: stars, engulfing, penetration slots, shooting star,
/// hammers, doji.
#[derive(Debug, Clone, Default)]
pub struct CandlestickDetector {
    config: PatternConfig,
}

impl CandlestickDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, candles: &[Candle]) -> Result<CandlePattern> {
        let [first, prev, last] = match candles {
            [.., a, b, c] => [a, b, c],
            _ => {
                return Err(Error::InsufficientData {
                    needed: 3,
                    got: candles.len(),
                })
            }
        };

        let first_m = CandleMetrics::of(first);
        let prev_m = CandleMetrics::of(prev);
        let last_m = CandleMetrics::of(last);

        let first_mid = (first.open + first.close) / 2.0;
        let middle_is_large = prev_m.body_size >= first_m.body_size * 0.7;

        let morning_star = first.is_bullish()
            && prev.is_bearish()
            && last.is_bullish()
            && last.close > first_mid
            && middle_is_large;

        let evening_star = first.is_bearish()
            && prev.is_bullish()
            && last.is_bearish()
            && last.close < first_mid
            && middle_is_large;

        let bullish_engulfing = prev.is_bearish()
            && last.is_bullish()
            && last.close >= prev.open
            && last.open <= prev.close;

        let bearish_engulfing = prev.is_bullish()
            && last.is_bearish()
            && last.open >= prev.close
            && last.close <= prev.open;

        let dark_cloud_cover = self
            .config
            .dark_cloud_cover
            .is_some_and(|slot| is_dark_cloud_cover(prev, last, &prev_m, slot));

        let piercing = self
            .config
            .piercing
            .is_some_and(|slot| is_piercing(prev, last, &prev_m, slot));

        let hammer =
            last_m.lower_wick >= last_m.body_size * 2.0 && last_m.upper_wick <= last_m.body_size * 0.5;

        let inverted_hammer =
            last_m.upper_wick >= last_m.body_size * 2.0 && last_m.lower_wick <= last_m.body_size * 0.5;

        let shooting_star = inverted_hammer && last.is_bearish();

        let doji = last_m.body_size <= last_m.total_range * 0.1;

        let ranked = [
            (morning_star, CandlePattern::MorningStar),
            (evening_star, CandlePattern::EveningStar),
            (bullish_engulfing, CandlePattern::BullishEngulfing),
            (bearish_engulfing, CandlePattern::BearishEngulfing),
            (dark_cloud_cover, CandlePattern::DarkCloudCover),
            (piercing, CandlePattern::Piercing),
            (shooting_star, CandlePattern::ShootingStar),
            (hammer, CandlePattern::Hammer),
            (inverted_hammer, CandlePattern::InvertedHammer),
            (doji, CandlePattern::Doji),
        ];

        Ok(ranked
            .into_iter()
            .find_map(|(hit, pattern)| hit.then_some(pattern))
            .unwrap_or(CandlePattern::None))
    }
}

fn is_dark_cloud_cover(prev: &Candle, last: &Candle, prev_m: &CandleMetrics, slot: PenetrationSlot) -> bool {
    let opens_above = if slot.require_gap {
        last.open > prev.high
    } else {
        last.open >= prev.close
    };
    prev.is_bullish()
        && last.is_bearish()
        && opens_above
        && last.close <= prev.close - prev_m.body_size * slot.penetration
        && last.close > prev.open
}

fn is_piercing(prev: &Candle, last: &Candle, prev_m: &CandleMetrics, slot: PenetrationSlot) -> bool {
    let opens_below = if slot.require_gap {
        last.open < prev.low
    } else {
        last.open <= prev.close
    };
    prev.is_bearish()
        && last.is_bullish()
        && opens_below
        && last.close >= prev.close + prev_m.body_size * slot.penetration
        && last.close < prev.open
}

/// Classify with no optional pattern slots configured.
pub fn detect_candlestick_pattern(candles: &[Candle]) -> Result<CandlePattern> {
    CandlestickDetector::default().detect(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: Utc.timestamp_opt(0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    // Flat body: neither bullish nor bearish, so it completes no multi-candle pattern.
    fn filler() -> Candle {
        candle(100.0, 100.6, 99.4, 100.0)
    }

    #[test]
    fn bullish_engulfing_classified() {
        let prev = candle(102.0, 102.2, 100.8, 101.0);
        let last = candle(100.9, 102.5, 100.7, 102.3);
        let p = detect_candlestick_pattern(&[filler(), prev, last]).unwrap();
        assert_eq!(p, CandlePattern::BullishEngulfing);
    }

    #[test]
    fn bearish_engulfing_classified() {
        let prev = candle(100.0, 101.2, 99.9, 101.0);
        let last = candle(101.1, 101.3, 99.5, 99.8);
        let p = detect_candlestick_pattern(&[candle(100.0, 100.2, 99.0, 99.1), prev, last]).unwrap();
        assert_eq!(p, CandlePattern::BearishEngulfing);
    }

    #[test]
    fn morning_star_outranks_engulfing() {
        let first = candle(100.0, 104.2, 99.8, 104.0);
        let prev = candle(103.5, 103.6, 100.3, 100.5);
        let last = candle(100.4, 104.0, 100.2, 103.8);
        let p = detect_candlestick_pattern(&[first, prev, last]).unwrap();
        assert_eq!(p, CandlePattern::MorningStar);
    }

    #[test]
    fn evening_star_classified() {
        let first = candle(104.0, 104.2, 99.8, 100.0);
        let prev = candle(100.5, 103.6, 100.4, 103.5);
        let last = candle(103.6, 103.7, 100.0, 100.2);
        let p = detect_candlestick_pattern(&[first, prev, last]).unwrap();
        assert_eq!(p, CandlePattern::EveningStar);
    }

    #[test]
    fn star_middle_body_at_seventy_percent_counts() {
        let morning = [
            candle(100.0, 110.2, 99.8, 110.0),
            candle(110.0, 110.1, 102.9, 103.0),
            candle(103.0, 108.2, 102.8, 108.0),
        ];
        assert_eq!(detect_candlestick_pattern(&morning).unwrap(), CandlePattern::MorningStar);

        let evening = [
            candle(110.0, 110.2, 99.8, 100.0),
            candle(100.0, 107.1, 99.9, 107.0),
            candle(107.0, 107.2, 101.8, 102.0),
        ];
        assert_eq!(detect_candlestick_pattern(&evening).unwrap(), CandlePattern::EveningStar);
    }

    #[test]
    fn star_middle_body_under_seventy_percent_is_not_a_star() {
        let morning = [
            candle(100.0, 110.2, 99.8, 110.0),
            candle(110.0, 110.1, 102.9, 103.5),
            candle(103.5, 108.2, 103.3, 108.0),
        ];
        assert_ne!(detect_candlestick_pattern(&morning).unwrap(), CandlePattern::MorningStar);
    }

    #[test]
    fn hammer_and_shooting_star() {
        let hammer = candle(100.0, 100.6, 98.0, 100.5);
        let p = detect_candlestick_pattern(&[filler(), filler(), hammer]).unwrap();
        assert_eq!(p, CandlePattern::Hammer);

        let shooting = candle(100.5, 102.5, 99.9, 100.0);
        let p = detect_candlestick_pattern(&[filler(), filler(), shooting]).unwrap();
        assert_eq!(p, CandlePattern::ShootingStar);

        let inverted = candle(100.0, 102.0, 99.9, 100.5);
        let p = detect_candlestick_pattern(&[filler(), filler(), inverted]).unwrap();
        assert_eq!(p, CandlePattern::InvertedHammer);
    }

    #[test]
    fn doji_when_body_is_tiny() {
        let doji = candle(100.0, 101.0, 99.0, 100.05);
        let p = detect_candlestick_pattern(&[filler(), filler(), doji]).unwrap();
        assert_eq!(p, CandlePattern::Doji);
    }

    #[test]
    fn plain_candle_is_none() {
        let plain = candle(100.0, 101.2, 99.6, 101.0);
        let p = detect_candlestick_pattern(&[filler(), filler(), plain]).unwrap();
        assert_eq!(p, CandlePattern::None);
    }

    #[test]
    fn needs_three_candles() {
        assert!(matches!(
            detect_candlestick_pattern(&[filler(), filler()]),
            Err(Error::InsufficientData { needed: 3, got: 2 })
        ));
    }

    #[test]
    fn dark_cloud_cover_only_when_configured() {
        let prev = candle(100.0, 102.1, 99.9, 102.0);
        let last = candle(102.2, 102.3, 100.6, 100.8);
        let window = [candle(99.0, 100.1, 98.9, 99.5), prev, last];

        assert_ne!(
            detect_candlestick_pattern(&window).unwrap(),
            CandlePattern::DarkCloudCover
        );

        let detector = CandlestickDetector::new(PatternConfig {
            dark_cloud_cover: Some(PenetrationSlot {
                penetration: 0.5,
                require_gap: false,
            }),
            piercing: None,
        });
        assert_eq!(detector.detect(&window).unwrap(), CandlePattern::DarkCloudCover);
    }

    #[test]
    fn piercing_respects_gap_requirement() {
        let prev = candle(102.0, 102.1, 99.9, 100.0);
        let last = candle(99.95, 101.6, 99.9, 101.5);
        let window = [candle(103.0, 103.1, 101.9, 102.0), prev, last];

        let gapless = CandlestickDetector::new(PatternConfig {
            piercing: Some(PenetrationSlot {
                penetration: 0.5,
                require_gap: false,
            }),
            ..Default::default()
        });
        assert_eq!(gapless.detect(&window).unwrap(), CandlePattern::Piercing);

        let gapped = CandlestickDetector::new(PatternConfig {
            piercing: Some(PenetrationSlot {
                penetration: 0.5,
                require_gap: true,
            }),
            ..Default::default()
        });
        assert_ne!(gapped.detect(&window).unwrap(), CandlePattern::Piercing);
    }
}
