//! Candle-window structure: candlestick patterns, trend, levels, pivots, volume.

pub mod candlestick;
pub mod levels;
pub mod trend;
pub mod trendlines;
pub mod volume;

pub use candlestick::{
    detect_candlestick_pattern, CandleMetrics, CandlePattern, CandlestickDetector, PatternConfig,
    PenetrationSlot,
};
pub use levels::{find_support_resistance, Levels};
pub use trend::detect_trend;
pub use trendlines::{detect_trendlines, is_trendline_valid, Pivot, Trendlines};
pub use volume::{detect_volume_divergence, is_volume_rising, VolumeDivergence};
