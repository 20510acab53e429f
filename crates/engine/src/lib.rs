//! Runtime around the strategy: exchange adapters, call budget, retries,
//! order execution, trade journal and the per-pair decision loop.

pub mod binance;
pub mod executor;
pub mod journal;
pub mod rate_limit;
pub mod retry;
pub mod settings;
pub mod trader;

pub use binance::BinanceClient;
pub use executor::{Execution, OrderExecutor};
pub use journal::{TradeJournal, TradeRecord};
pub use rate_limit::{RateLimitConfig, RateLimitedClient, RateLimiter};
pub use retry::RetryPolicy;
pub use settings::{BotFileConfig, TradingSection};
pub use trader::{CycleReport, PairContext, Schedule, Trader};
