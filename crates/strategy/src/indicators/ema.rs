use common::{Error, Result};

/// Exponential moving average, seeded with the first price.
///
/// Uses the smoothing constant `k = 2 / period` and returns only the final value.
pub fn ema(prices: &[f64], period: usize) -> Result<f64> {
    if period == 0 {
        return Err(Error::InvalidPeriod {
            period,
            len: prices.len(),
        });
    }
    let (&seed, rest) = prices
        .split_first()
        .ok_or(Error::InsufficientData { needed: 1, got: 0 })?;

    let k = 2.0 / period as f64;
    Ok(rest
        .iter()
        .fold(seed, |prev, &price| price * k + prev * (1.0 - k)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_of_single_price_is_the_price() {
        assert_eq!(ema(&[42.0], 10).unwrap(), 42.0);
    }

    #[test]
    fn ema_known_value() {
        // k = 0.5: 10 -> 15 -> 17.5
        let value = ema(&[10.0, 20.0, 20.0], 4).unwrap();
        assert!((value - 17.5).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn ema_of_constant_series_is_constant() {
        let value = ema(&[3.0; 20], 7).unwrap();
        assert!((value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn ema_rejects_empty_and_zero_period() {
        assert!(matches!(ema(&[], 3), Err(Error::InsufficientData { .. })));
        assert!(matches!(ema(&[1.0], 0), Err(Error::InvalidPeriod { .. })));
    }
}
