//! Accounting adapter: CPU-hour consumption from the batch scheduler.
//!
//! Every [`AccountingSource`] is infallible from the caller's point of view.
//! Timeouts, spawn failures and malformed output are logged and degrade to
//! an empty [`UsageReport`].

pub mod command;
pub mod error;
pub mod fixed;
pub mod report;
pub mod source;

pub use command::{AccountingConfig, CommandAccounting};
pub use error::AccountingError;
pub use fixed::StaticAccounting;
pub use report::{account_key, parse_report, UsageReport, UsageRow, TOTAL_KEY};
pub use source::AccountingSource;
