//! Runs the scheduler's reporting command and parses its output.
//!
//! The command line is taken from `ACCOUNTING_COMMAND`, e.g.
//! `sreport -P -n -t hours cluster AccountUtilizationByUser`. The adapter
//! appends `Accounts=a,b Start=YYYY-MM-DD End=YYYY-MM-DD`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use hpcalloc_core::types::Timestamp;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::AccountingError;
use crate::report::{account_key, parse_report, UsageReport};
use crate::source::AccountingSource;

/// Default timeout for one accounting query.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum stdout or stderr captured per stream (4 MiB).
const MAX_OUTPUT_BYTES: u64 = 4 * 1024 * 1024;

/// Date format the scheduler expects for `Start=` / `End=`.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Command line and timeout of the reporting command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl AccountingConfig {
    /// Parse a whitespace-separated command line.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
            timeout,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable                  | Required | Default |
    /// |---------------------------|----------|---------|
    /// | `ACCOUNTING_COMMAND`      | yes      |         |
    /// | `ACCOUNTING_TIMEOUT_SECS` | no       | `30`    |
    ///
    /// Returns `None` when no command is configured.
    pub fn from_env() -> Option<Self> {
        let line = std::env::var("ACCOUNTING_COMMAND").ok()?;
        let secs = std::env::var("ACCOUNTING_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::from_command_line(&line, Duration::from_secs(secs))
    }
}

/// [`AccountingSource`] backed by an external command.
pub struct CommandAccounting {
    config: AccountingConfig,
}

impl CommandAccounting {
    pub fn new(config: AccountingConfig) -> Self {
        Self { config }
    }

    /// Arguments appended for one query.
    fn query_args(accounts: &[String], start: Timestamp, end: Timestamp) -> Vec<String> {
        vec![
            format!(
                "Accounts={}",
                accounts.iter().map(|a| account_key(a)).collect::<Vec<_>>().join(",")
            ),
            format!("Start={}", start.format(DATE_FORMAT)),
            format!("End={}", end.format(DATE_FORMAT)),
        ]
    }

    /// Run the command once and return its stdout.
    pub async fn run(
        &self,
        accounts: &[String],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<String, AccountingError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .args(Self::query_args(accounts, start, end))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        // On timeout `child` is dropped and killed.
        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                return Err(AccountingError::Timeout {
                    secs: self.config.timeout.as_secs(),
                })
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(AccountingError::ExitStatus {
                code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[async_trait]
impl AccountingSource for CommandAccounting {
    async fn usage(&self, accounts: &[String], start: Timestamp, end: Timestamp) -> UsageReport {
        if accounts.is_empty() {
            return UsageReport::new();
        }
        match self.run(accounts, start, end).await {
            Ok(output) => {
                let report = parse_report(&output);
                if report.is_empty() {
                    tracing::warn!(accounts = ?accounts, "Accounting returned no usable data");
                }
                report
            }
            Err(e) => {
                tracing::error!(error = %e, accounts = ?accounts, "Accounting unavailable");
                UsageReport::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> Timestamp {
        chrono::Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn source(line: &str, secs: u64) -> CommandAccounting {
        CommandAccounting::new(
            AccountingConfig::from_command_line(line, Duration::from_secs(secs)).unwrap(),
        )
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        let config =
            AccountingConfig::from_command_line("sreport -P -n  cluster", Duration::from_secs(5))
                .unwrap();
        assert_eq!(config.program, "sreport");
        assert_eq!(config.args, vec!["-P", "-n", "cluster"]);
        assert!(AccountingConfig::from_command_line("   ", Duration::from_secs(5)).is_none());
    }

    #[test]
    fn query_args_carry_accounts_and_dates() {
        let args = CommandAccounting::query_args(
            &["A042".to_string(), "b007".to_string()],
            ts(2024, 1, 10),
            ts(2024, 7, 10),
        );
        assert_eq!(
            args,
            vec!["Accounts=a042,b007", "Start=2024-01-10", "End=2024-07-10"]
        );
    }

    #[tokio::test]
    async fn parses_command_output() {
        let accounting = source("printf hpc|a042||A042|15|", 5);
        let report = accounting
            .usage(&["a042".to_string()], ts(2024, 1, 1), ts(2024, 2, 1))
            .await;
        // printf ignores the appended query args.
        assert_eq!(report.total("a042"), 15);
    }

    #[tokio::test]
    async fn missing_program_degrades_to_empty() {
        let accounting = source("/nonexistent/sreport", 5);
        let report = accounting
            .usage(&["a042".to_string()], ts(2024, 1, 1), ts(2024, 2, 1))
            .await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        // The script ignores the appended query args.
        let accounting = CommandAccounting::new(AccountingConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "sleep 5".into(), "sh".into()],
            timeout: Duration::from_secs(1),
        });
        let err = accounting
            .run(&["a042".to_string()], ts(2024, 1, 1), ts(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::Timeout { secs: 1 }));
    }

    #[tokio::test]
    async fn failing_command_is_an_exit_status_error() {
        let accounting = source("false", 5);
        let err = accounting
            .run(&["a042".to_string()], ts(2024, 1, 1), ts(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::ExitStatus { .. }));
    }
}
