//! Exit rules and order sizing. Pure functions of positions, prices and balances.

pub mod exit;
pub mod sizing;

pub use exit::{BacklogPolicy, ExitContext, ExitPolicy, ExitReason};
pub use sizing::{Capital, SizingConfig};
