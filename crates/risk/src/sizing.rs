use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// How much quote currency a single buy may commit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Capital {
    /// Fixed quote amount per trade.
    Fixed { amount: f64 },
    /// Share of the free quote balance, in percent.
    PercentOfBalance { percent: f64 },
}

/// Order sizing rules for market buys and sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub capital: Capital,
    /// Taker fee in percent, reserved out of the quote balance before buying.
    pub fee_pct: f64,
    /// Smallest base volume the venue accepts.
    pub min_volume: f64,
    /// Base volume precision. Volumes are rounded down to it.
    pub volume_decimals: u32,
    /// Leftover base balance worth less than this (in quote) is swept into the sell.
    pub dust_quote_value: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            capital: Capital::Fixed { amount: 100.0 },
            fee_pct: 0.4,
            min_volume: 0.001,
            volume_decimals: 8,
            dust_quote_value: 5.0,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        match self.capital {
            Capital::Fixed { amount } if !(amount > 0.0) => {
                return Err(Error::Config(format!(
                    "sizing.capital.amount must be positive, got {amount}"
                )))
            }
            Capital::PercentOfBalance { percent } if !(percent > 0.0 && percent <= 100.0) => {
                return Err(Error::Config(format!(
                    "sizing.capital.percent must be in (0, 100], got {percent}"
                )))
            }
            _ => {}
        }
        if !(0.0..100.0).contains(&self.fee_pct) {
            return Err(Error::Config(format!(
                "sizing.fee_pct must be in [0, 100), got {}",
                self.fee_pct
            )));
        }
        if self.min_volume < 0.0 || self.dust_quote_value < 0.0 {
            return Err(Error::Config(
                "sizing.min_volume and dust_quote_value must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Base volume to buy at `price` with `quote_balance` free, or `None`
    /// when the result would fall under the venue minimum.
    pub fn buy_volume(&self, quote_balance: f64, price: f64) -> Option<f64> {
        if price <= 0.0 || quote_balance <= 0.0 {
            return None;
        }
        let budget = match self.capital {
            Capital::Fixed { amount } => amount,
            Capital::PercentOfBalance { percent } => quote_balance * percent / 100.0,
        };
        let spendable = budget.min(quote_balance * (1.0 - self.fee_pct / 100.0));
        let volume = self.floor_volume(spendable / price);
        (volume >= self.min_volume && volume > 0.0).then_some(volume)
    }

    /// Base volume to sell for a position of `position_volume` given the free
    /// `base_balance`. Sweeps the whole balance when what would remain is dust.
    pub fn sell_volume(&self, position_volume: f64, base_balance: f64, price: f64) -> Option<f64> {
        if base_balance <= 0.0 {
            return None;
        }
        let mut volume = position_volume.min(base_balance);
        let leftover = base_balance - volume;
        if leftover * price < self.dust_quote_value {
            volume = base_balance;
        }
        let volume = self.floor_volume(volume);
        (volume > 0.0).then_some(volume)
    }

    fn floor_volume(&self, volume: f64) -> f64 {
        let scale = 10f64.powi(self.volume_decimals as i32);
        (volume * scale).floor() / scale
    }
}
