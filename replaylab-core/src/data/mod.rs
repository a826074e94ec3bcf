//! Market data plumbing: timeframe aggregation, indicator frames, synthetic bars.

pub mod aggregate;
pub mod frame;
pub mod synthetic;

pub use aggregate::{aggregate, bucket_label, closed_before, closed_count_as_of, TimeframeAggregator};
pub use frame::{columns, Frame, FrameView};
