use crate::{Error, Result, TradingMode};

/// Process configuration loaded from environment variables at startup.
///
/// Trading parameters (pair, thresholds, weights) live in the TOML file at
/// `bot_config_path`; this only carries secrets and locations.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,

    // Exchange credentials, required in live mode only
    pub binance_api_key: String,
    pub binance_secret: String,

    // Paper simulation
    pub paper_slippage_bps: f64,
    pub paper_fee_pct: f64,
    pub paper_initial_balance: f64,

    // Storage
    pub ledger_path: String,
    pub database_url: String,

    pub bot_config_path: String,
}

impl Config {
    /// Load configuration from environment variables. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode: TradingMode = required_env("TRADING_MODE")?.parse()?;

        let (binance_api_key, binance_secret) = match trading_mode {
            TradingMode::Live => (required_env("BINANCE_API_KEY")?, required_env("BINANCE_SECRET")?),
            TradingMode::Paper => (
                optional_env("BINANCE_API_KEY").unwrap_or_default(),
                optional_env("BINANCE_SECRET").unwrap_or_default(),
            ),
        };

        Ok(Config {
            trading_mode,
            binance_api_key,
            binance_secret,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 10.0)?,
            paper_fee_pct: parsed_env("PAPER_FEE_PCT", 0.4)?,
            paper_initial_balance: parsed_env("PAPER_INITIAL_BALANCE", 1_000.0)?,
            ledger_path: optional_env("LEDGER_PATH").unwrap_or_else(|| "orders.json".to_string()),
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://trades.db?mode=rwc".to_string()),
            bot_config_path: optional_env("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/pairtrader.toml".to_string()),
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env(key: &str, default: f64) -> Result<f64> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a number, got '{raw}'"))),
    }
}
