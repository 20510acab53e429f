use common::{Decision, Error, Result};

/// Simple moving average series plus the price-vs-average reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SmaResult {
    /// One average per full window, aligned to the window's last price.
    pub values: Vec<f64>,
    /// `Buy` when the last price is strictly above the last average, else `Sell`.
    pub decision: Decision,
}

impl SmaResult {
    pub fn last(&self) -> f64 {
        self.values.last().copied().unwrap_or_default()
    }
}

pub fn sma(prices: &[f64], period: usize) -> Result<SmaResult> {
    if period < 1 || period > prices.len() {
        return Err(Error::InvalidPeriod {
            period,
            len: prices.len(),
        });
    }

    let values: Vec<f64> = prices
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect();

    let last_price = prices[prices.len() - 1];
    let last_sma = values[values.len() - 1];
    let decision = if last_price > last_sma {
        Decision::Buy
    } else {
        Decision::Sell
    };

    Ok(SmaResult { values, decision })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_three_over_five_prices() {
        let result = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_eq!(result.values, vec![2.0, 3.0, 4.0]);
        assert_eq!(result.decision, Decision::Buy);
    }

    #[test]
    fn sma_flat_series_reads_sell() {
        let result = sma(&[2.0; 6], 3).unwrap();
        assert_eq!(result.decision, Decision::Sell);
    }

    #[test]
    fn sma_rejects_zero_and_oversized_period() {
        assert!(matches!(
            sma(&[1.0, 2.0], 0),
            Err(Error::InvalidPeriod { period: 0, len: 2 })
        ));
        assert!(matches!(
            sma(&[1.0, 2.0], 3),
            Err(Error::InvalidPeriod { period: 3, len: 2 })
        ));
    }

    #[test]
    fn sma_period_equal_to_length_gives_single_value() {
        let result = sma(&[1.0, 2.0, 6.0], 3).unwrap();
        assert_eq!(result.values, vec![3.0]);
        assert_eq!(result.last(), 3.0);
    }
}
