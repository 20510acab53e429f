use common::{Error, Result};

use super::round_to;

/// RSI (Relative Strength Index) indicator.
///
/// Wilder smoothing. The seed averages cover the deltas inside the first
/// `period` prices and are divided by `period`; every later delta is smoothed
/// in. A window with no losses reads `rs = 100`, so a strictly rising series
/// tops out at 99.01 rather than exactly 100.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Compute RSI from a slice of close prices (oldest first), rounded to 2 decimals.
    pub fn compute(&self, closes: &[f64]) -> Result<f64> {
        let period = self.period;
        if period == 0 {
            return Err(Error::InvalidPeriod {
                period,
                len: closes.len(),
            });
        }
        if closes.len() < period {
            return Err(Error::InsufficientData {
                needed: period,
                got: closes.len(),
            });
        }

        let mut gains = 0.0;
        let mut losses = 0.0;
        for w in closes[..period].windows(2) {
            let delta = w[1] - w[0];
            if delta < 0.0 {
                losses -= delta;
            } else {
                gains += delta;
            }
        }

        let mut avg_gain = gains / period as f64;
        let mut avg_loss = losses / period as f64;

        for w in closes[period - 1..].windows(2) {
            let delta = w[1] - w[0];
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
        Ok(round_to(100.0 - 100.0 / (1.0 + rs), 2))
    }
}

/// Shorthand for `RsiIndicator::new(period).compute(prices)`.
pub fn rsi(prices: &[f64], period: usize) -> Result<f64> {
    RsiIndicator::new(period).compute(prices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_errors_when_insufficient_data() {
        let prices = vec![100.0; 13];
        assert!(matches!(
            rsi(&prices, 14),
            Err(Error::InsufficientData { needed: 14, got: 13 })
        ));
    }

    #[test]
    fn rsi_accepts_exactly_period_values() {
        let prices: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&prices, 14).is_ok());
    }

    #[test]
    fn rsi_all_gains_approaches_100() {
        let prices: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let value = rsi(&prices, 14).unwrap();
        assert!(value > 99.0, "Expected ~100, got {value}");
        assert!(value <= 100.0);
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let value = rsi(&prices, 14).unwrap();
        assert!((value - 0.0).abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_is_rounded_to_two_decimals() {
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09, 44.50, 44.90,
        ];
        let value = rsi(&prices, 14).unwrap();
        assert!((0.0..=100.0).contains(&value), "RSI out of range: {value}");
        assert!(((value * 100.0).round() - value * 100.0).abs() < 1e-6);
    }

    #[test]
    fn rsi_rejects_zero_period() {
        assert!(matches!(rsi(&[1.0, 2.0], 0), Err(Error::InvalidPeriod { .. })));
    }
}
