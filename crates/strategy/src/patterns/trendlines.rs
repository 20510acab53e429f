use chrono::{DateTime, Utc};
use serde::Serialize;

use common::Candle;

use crate::indicators::linear_regression;

/// A local extreme confirmed by `confirmation` candles on each side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pivot {
    pub price: f64,
    /// Position in the analysed window.
    pub index: usize,
    pub time: DateTime<Utc>,
    pub confirmation: usize,
}

/// Most recent pivots of each kind, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trendlines {
    /// Local lows.
    pub support: Vec<Pivot>,
    /// Local highs.
    pub resistance: Vec<Pivot>,
}

impl Trendlines {
    pub fn support_prices(&self) -> Vec<f64> {
        self.support.iter().map(|p| p.price).collect()
    }

    pub fn resistance_prices(&self) -> Vec<f64> {
        self.resistance.iter().map(|p| p.price).collect()
    }
}

pub fn detect_trendlines(candles: &[Candle], pivot_count: usize, strictness: usize) -> Trendlines {
    let mut lines = Trendlines::default();
    if candles.len() <= strictness * 2 {
        return lines;
    }

    for i in strictness..candles.len() - strictness {
        let c = &candles[i];
        let neighbours = (1..=strictness).flat_map(|n| [&candles[i - n], &candles[i + n]]);

        let is_support = neighbours.clone().all(|o| c.low < o.low);
        let is_resistance = neighbours.clone().all(|o| c.high > o.high);

        if is_support {
            lines.support.push(Pivot {
                price: c.low,
                index: i,
                time: c.time,
                confirmation: strictness,
            });
        }
        if is_resistance {
            lines.resistance.push(Pivot {
                price: c.high,
                index: i,
                time: c.time,
                confirmation: strictness,
            });
        }
    }

    for pivots in [&mut lines.support, &mut lines.resistance] {
        pivots.sort_by(|a, b| b.index.cmp(&a.index));
        pivots.truncate(pivot_count);
    }
    lines
}

/// A pivot sequence forms a usable line when its fit is both steep enough
/// (`|slope| > 0.005`) and tight enough (`r2 > 0.4`).
pub fn is_trendline_valid(points: &[f64]) -> bool {
    if points.len() < 2 {
        return false;
    }
    let fit = linear_regression(points);
    fit.slope.abs() > 0.005 && fit.r2 > 0.4
}
