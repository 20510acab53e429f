use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

use crate::indicators::sma;

/// Joint reading of price direction and volume participation over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeDivergence {
    StrongUptrend,
    StrongDowntrend,
    WeakUptrend,
    WeakDowntrend,
    Neutral,
}

impl std::fmt::Display for VolumeDivergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VolumeDivergence::StrongUptrend => "strong-uptrend",
            VolumeDivergence::StrongDowntrend => "strong-downtrend",
            VolumeDivergence::WeakUptrend => "weak-uptrend",
            VolumeDivergence::WeakDowntrend => "weak-downtrend",
            VolumeDivergence::Neutral => "neutral",
        };
        f.write_str(name)
    }
}

/// Price direction is first-to-last close; volume is "up" when the last
/// candle's volume beats the average of the trailing half window.
pub fn detect_volume_divergence(candles: &[Candle]) -> Result<VolumeDivergence> {
    if candles.len() < 10 {
        return Err(Error::InsufficientData {
            needed: 10,
            got: candles.len(),
        });
    }

    let first = &candles[0];
    let last = &candles[candles.len() - 1];
    let price_change = last.close - first.close;

    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let volume_avg = sma(&volumes, candles.len() / 2)?.last();
    let volume_up = last.volume > volume_avg;

    let divergence = match (price_change, volume_up) {
        (p, true) if p > 0.0 => VolumeDivergence::StrongUptrend,
        (p, false) if p > 0.0 => VolumeDivergence::WeakUptrend,
        (p, true) if p < 0.0 => VolumeDivergence::StrongDowntrend,
        (p, false) if p < 0.0 => VolumeDivergence::WeakDowntrend,
        _ => VolumeDivergence::Neutral,
    };
    Ok(divergence)
}

/// True when no volume in the window is lower than the one before it.
pub fn is_volume_rising(candles: &[Candle]) -> bool {
    !candles.is_empty() && candles.windows(2).all(|w| w[1].volume >= w[0].volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ohlcv;

    fn window(start: f64, end: f64, last_volume: f64) -> Vec<Candle> {
        (0..10)
            .map(|i| {
                let close = start + (end - start) * i as f64 / 9.0;
                let volume = if i == 9 { last_volume } else { 10.0 };
                ohlcv(i, close, close + 0.1, close - 0.1, close, volume)
            })
            .collect()
    }

    #[test]
    fn classifies_all_quadrants() {
        use VolumeDivergence::*;
        assert_eq!(detect_volume_divergence(&window(100.0, 105.0, 30.0)).unwrap(), StrongUptrend);
        assert_eq!(detect_volume_divergence(&window(100.0, 105.0, 5.0)).unwrap(), WeakUptrend);
        assert_eq!(detect_volume_divergence(&window(105.0, 100.0, 30.0)).unwrap(), StrongDowntrend);
        assert_eq!(detect_volume_divergence(&window(105.0, 100.0, 5.0)).unwrap(), WeakDowntrend);
    }

    #[test]
    fn unchanged_price_is_neutral() {
        assert_eq!(
            detect_volume_divergence(&window(100.0, 100.0, 30.0)).unwrap(),
            VolumeDivergence::Neutral
        );
    }

    #[test]
    fn divergence_needs_ten_candles() {
        assert!(detect_volume_divergence(&window(100.0, 101.0, 1.0)[..9]).is_err());
    }

    #[test]
    fn volume_rising_rejects_any_drop() {
        let mut candles: Vec<Candle> = (0..4)
            .map(|i| ohlcv(i, 1.0, 1.0, 1.0, 1.0, 10.0 + i as f64))
            .collect();
        assert!(is_volume_rising(&candles));
        candles[2].volume = 10.5;
        assert!(!is_volume_rising(&candles));
    }

    #[test]
    fn volume_rising_edge_cases() {
        assert!(!is_volume_rising(&[]));
        assert!(is_volume_rising(&[ohlcv(0, 1.0, 1.0, 1.0, 1.0, 5.0)]));
        let flat: Vec<Candle> = (0..3).map(|i| ohlcv(i, 1.0, 1.0, 1.0, 1.0, 5.0)).collect();
        assert!(is_volume_rising(&flat));
    }
}
