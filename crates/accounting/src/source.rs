use async_trait::async_trait;
use hpcalloc_core::types::Timestamp;

use crate::report::UsageReport;

/// Where consumption figures come from.
///
/// Implementations must not fail: an unavailable or garbled source yields
/// an empty report and logs why.
#[async_trait]
pub trait AccountingSource: Send + Sync {
    async fn usage(&self, accounts: &[String], start: Timestamp, end: Timestamp) -> UsageReport;
}
