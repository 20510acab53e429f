use std::collections::BTreeMap;

use serde::Serialize;

use common::{Candle, Error, Result};

/// Touches needed before a rounded price counts as a level.
const MIN_TOUCHES: usize = 2;

/// Volume-confirmed support and resistance levels near the current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Levels {
    /// Ascending.
    pub supports: Vec<f64>,
    /// Ascending.
    pub resistances: Vec<f64>,
    pub current_price: f64,
}

impl Levels {
    /// Lowest significant support.
    pub fn key_support(&self) -> Option<f64> {
        self.supports.first().copied()
    }

    /// Highest significant resistance.
    pub fn key_resistance(&self) -> Option<f64> {
        self.resistances.last().copied()
    }
}

/// Extract levels from candles whose volume is strictly above the window average.
///
/// Lows and highs are rounded (1 decimal above a price of 100, else 3) so that
/// nearby touches cluster. A level is kept when it has at least two touches
/// and lies within `proximity` (a fraction, e.g. `0.02`) of the last close.
pub fn find_support_resistance(candles: &[Candle], proximity: f64) -> Result<Levels> {
    if candles.len() < 10 {
        return Err(Error::InsufficientData {
            needed: 10,
            got: candles.len(),
        });
    }

    let current_price = candles[candles.len() - 1].close;
    let avg_volume = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
    let confirmed: Vec<&Candle> = candles.iter().filter(|c| c.volume > avg_volume).collect();

    let decimals = if current_price > 100.0 { 1 } else { 3 };
    let significant = |prices: &mut dyn Iterator<Item = f64>| -> Vec<f64> {
        let scale = 10f64.powi(decimals);
        let mut touches: BTreeMap<i64, usize> = BTreeMap::new();
        for price in prices {
            *touches.entry((price * scale).round() as i64).or_default() += 1;
        }
        touches
            .into_iter()
            .filter(|&(_, count)| count >= MIN_TOUCHES)
            .map(|(key, _)| key as f64 / scale)
            .filter(|level| (level - current_price).abs() <= current_price * proximity)
            .collect()
    };

    Ok(Levels {
        supports: significant(&mut confirmed.iter().map(|c| c.low)),
        resistances: significant(&mut confirmed.iter().map(|c| c.high)),
        current_price,
    })
}
