use common::{Candle, Error, Result};

use crate::indicators::{try_linear_regression, Trend};

/// Classify a candle window as up, down or sideways from the slopes of its
/// highs and lows.
///
/// The flat band widens with the window's volatility:
/// `threshold = base * (1 + ln(1 + normalized_volatility * 100))`.
/// An uptrend needs lows rising faster than highs (`low > t`, `high > t/2`),
/// a downtrend needs highs falling faster than lows.
pub fn detect_trend(candles: &[Candle], base_flat_threshold: f64) -> Result<Trend> {
    if candles.len() < 10 {
        return Err(Error::InsufficientData {
            needed: 10,
            got: candles.len(),
        });
    }

    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let high_slope = try_linear_regression(&highs)?.slope;
    let low_slope = try_linear_regression(&lows)?.slope;

    let max_high = highs.iter().copied().fold(f64::MIN, f64::max);
    let min_low = lows.iter().copied().fold(f64::MAX, f64::min);
    let first_close = candles[0].close;
    let normalized_volatility = if first_close > 0.0 {
        (max_high - min_low) / first_close
    } else {
        0.0
    };
    let threshold = base_flat_threshold * (1.0 + (normalized_volatility * 100.0).ln_1p());

    let trend = if low_slope > threshold && high_slope > threshold / 2.0 {
        Trend::Uptrend
    } else if high_slope < -threshold && low_slope < -threshold / 2.0 {
        Trend::Downtrend
    } else {
        Trend::Sideways
    };
    Ok(trend)
}
