//! Domain types for replaylab

pub mod bar;
pub mod ids;
pub mod signal;
pub mod timeframe;
pub mod trade;

pub use bar::Bar;
pub use ids::{ConfigHash, DatasetHash, RunId, TradeId, TradeIdGen};
pub use signal::{Bias, Confirmation, Direction, Signal};
pub use timeframe::Timeframe;
pub use trade::{ExitReason, Trade};
