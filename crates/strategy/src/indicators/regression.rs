use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Direction of a fitted line or of a candle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Uptrend => write!(f, "uptrend"),
            Trend::Downtrend => write!(f, "downtrend"),
            Trend::Sideways => write!(f, "sideways"),
        }
    }
}

/// Goodness of fit bucket derived from R².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    fn from_r2(r2: f64) -> Self {
        if r2 > 0.7 {
            Strength::Strong
        } else if r2 > 0.4 {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }
}

/// Ordinary least squares fit of a series against its index `0..n-1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
    pub trend: Trend,
    pub strength: Strength,
}

impl Regression {
    /// Flat, weak fit used when there is nothing to regress.
    pub fn neutral() -> Self {
        Self {
            slope: 0.0,
            intercept: 0.0,
            r2: 0.0,
            trend: Trend::Sideways,
            strength: Strength::Weak,
        }
    }
}

/// Fits `series` against its index. Fewer than two points is an error.
pub fn try_linear_regression(series: &[f64]) -> Result<Regression> {
    let n = series.len();
    if n < 2 {
        return Err(Error::InsufficientData { needed: 2, got: n });
    }

    let nf = n as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in series.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / (nf * sum_xx - sum_x * sum_x);
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let (mut ss_tot, mut ss_res) = (0.0, 0.0);
    for (i, &y) in series.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        ss_tot += (y - mean_y).powi(2);
        ss_res += (y - predicted).powi(2);
    }
    // A constant series explains nothing.
    let r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    let trend = if slope > 0.0 {
        Trend::Uptrend
    } else if slope < 0.0 {
        Trend::Downtrend
    } else {
        Trend::Sideways
    };

    Ok(Regression {
        slope,
        intercept,
        r2,
        trend,
        strength: Strength::from_r2(r2),
    })
}

/// Like [`try_linear_regression`] but degrades to [`Regression::neutral`] on
/// short input so callers in the scoring pipeline never have to branch.
pub fn linear_regression(series: &[f64]) -> Regression {
    try_linear_regression(series).unwrap_or_else(|_| Regression::neutral())
}
