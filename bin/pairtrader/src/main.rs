use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, ExchangeClient, TradingMode};
use engine::{BinanceClient, BotFileConfig, PairContext, RateLimiter, TradeJournal, Trader};
use ledger::Ledger;
use paper::PaperClient;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().unwrap_or_else(|e| panic!("{e}"));
    let bot = BotFileConfig::load(&cfg.bot_config_path).unwrap_or_else(|e| panic!("{e}"));
    let pair = bot.trading.pair.clone();
    info!(mode = %cfg.trading_mode, pair = %pair, "PairTrader starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let journal = TradeJournal::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to open trade journal at '{}': {e}", cfg.database_url));

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange_client: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using BinanceClient");
            Arc::new(
                BinanceClient::new(&cfg.binance_api_key, &cfg.binance_secret)
                    .unwrap_or_else(|e| panic!("{e}")),
            )
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, using PaperClient");
            // Real public candles; orders and balances stay simulated.
            let market_data = BinanceClient::new("", "").unwrap_or_else(|e| panic!("{e}"));
            Arc::new(
                PaperClient::new(
                    pair.quote.clone(),
                    cfg.paper_initial_balance,
                    cfg.paper_slippage_bps,
                    cfg.paper_fee_pct,
                )
                .with_upstream(Arc::new(market_data)),
            )
        }
    };

    // ── Pair context ──────────────────────────────────────────────────────────
    let ctx = PairContext {
        pair: pair.clone(),
        candle_interval_minutes: bot.trading.candle_interval_minutes,
        ledger: Ledger::open(&cfg.ledger_path),
        limiter: Arc::new(RateLimiter::new(bot.rate_limit.clone())),
    };
    let trader = Trader::new(ctx, exchange_client, Some(journal), &bot, cfg.trading_mode);

    // ── Spawn ─────────────────────────────────────────────────────────────────
    let handle = tokio::spawn(trader.run());

    info!("Trader started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .unwrap_or_else(|e| panic!("Failed to listen for shutdown signal: {e}"));
    handle.abort();
    info!("Shutdown signal received. Exiting.");
}
