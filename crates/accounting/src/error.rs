/// Failures talking to the external accounting command.
///
/// These never leave the adapter; they are logged and the caller receives
/// an empty report.
#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    #[error("Failed to run accounting command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Accounting command timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Accounting command exited with code {code}: {stderr}")]
    ExitStatus { code: i32, stderr: String },

    #[error("Accounting command is not configured")]
    NotConfigured,
}
