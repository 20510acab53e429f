//! Pure numeric indicators over price series (oldest first).

pub mod ema;
pub mod regression;
pub mod rsi;
pub mod sma;

pub use ema::ema;
pub use regression::{linear_regression, try_linear_regression, Regression, Strength, Trend};
pub use rsi::{rsi, RsiIndicator};
pub use sma::{sma, SmaResult};

/// Percentage move from `past` to `current`, rounded to 2 decimals.
/// Returns 0 when `past` is not a positive price.
pub fn percentage_change(current: f64, past: f64) -> f64 {
    if past <= 0.0 {
        return 0.0;
    }
    round_to((current - past) / past * 100.0, 2)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_change_rounds_to_two_decimals() {
        assert_eq!(percentage_change(101.4, 100.0), 1.4);
        assert_eq!(percentage_change(90.0, 100.0), -10.0);
        assert_eq!(percentage_change(1.0 / 3.0, 0.3), 11.11);
    }

    #[test]
    fn percentage_change_against_zero_is_zero() {
        assert_eq!(percentage_change(50.0, 0.0), 0.0);
    }
}
