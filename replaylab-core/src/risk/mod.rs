//! Risk — position sizing and the equity / per-period PnL ledger.
//!
//! Sizing uses equity at signal time. The ledger owns one `PeriodRecord` per
//! calendar day and per ISO week; records are created on first touch and
//! frozen once a later period has been touched.

pub mod ledger;
pub mod sizing;

pub use ledger::{LedgerError, PeriodRecord, RiskLedger, WeekKey};
pub use sizing::{position_size, PositionSize, EPSILON};
