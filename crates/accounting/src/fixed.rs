//! A source backed by a fixed report, for dry runs and tests.

use async_trait::async_trait;
use hpcalloc_core::types::Timestamp;

use crate::report::UsageReport;
use crate::source::AccountingSource;

/// Returns the same report for every interval.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounting {
    report: UsageReport,
}

impl StaticAccounting {
    pub fn new(report: UsageReport) -> Self {
        Self { report }
    }

    /// No consumption recorded anywhere.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountingSource for StaticAccounting {
    async fn usage(&self, accounts: &[String], _start: Timestamp, _end: Timestamp) -> UsageReport {
        self.report.restricted_to(accounts)
    }
}
