//! Usage report model and the scheduler output parser.
//!
//! The scheduler prints one pipe-delimited line per account and user:
//!
//! ```text
//! cluster|account|login|proper name|used
//! hpc|a042||A042 project|1520
//! hpc|a042|alice|Alice Martin|1200
//! ```
//!
//! An empty login marks the account total. Headers, blank lines and
//! malformed lines are skipped. Account names are case-insensitive: the
//! scheduler reports `a042` for project `A042`.

use std::collections::BTreeMap;

use hpcalloc_core::usage::project_total;
use serde::Serialize;

/// Key under which an account's project-wide consumption is stored.
pub const TOTAL_KEY: &str = "total";

/// Scheduler spelling of an account or project name.
pub fn account_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// One consumption figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRow {
    pub account: String,
    /// `None` for the account-wide row.
    pub login: Option<String>,
    pub hours: i64,
}

/// `account -> (login | "total") -> hours`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    accounts: BTreeMap<String, BTreeMap<String, i64>>,
}

impl UsageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from rows.
    ///
    /// When an account has no explicit total row, the total is left unset
    /// rather than summed from users, which may not cover every job.
    pub fn from_rows(rows: &[UsageRow]) -> Self {
        let mut report = Self::new();
        for row in rows {
            let entry = report.accounts.entry(account_key(&row.account)).or_default();
            if let Some(login) = &row.login {
                *entry.entry(login.clone()).or_insert(0) += row.hours;
            }
        }
        for (account, users) in report.accounts.iter_mut() {
            let rows_for_account = rows
                .iter()
                .filter(|r| account_key(&r.account) == *account)
                .map(|r| (r.login.as_deref(), r.hours));
            let has_total = rows
                .iter()
                .any(|r| account_key(&r.account) == *account && r.login.is_none());
            if has_total {
                users.insert(TOTAL_KEY.to_string(), project_total(rows_for_account));
            }
        }
        report
    }

    pub fn insert(&mut self, account: &str, login: &str, hours: i64) {
        self.accounts
            .entry(account_key(account))
            .or_default()
            .insert(login.to_string(), hours);
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Per-login figures of an account, including the `"total"` entry.
    pub fn account(&self, account: &str) -> Option<&BTreeMap<String, i64>> {
        self.accounts.get(&account_key(account))
    }

    /// Project-wide consumption of `account`; zero when unknown.
    pub fn total(&self, account: &str) -> i64 {
        self.accounts
            .get(&account_key(account))
            .and_then(|users| users.get(TOTAL_KEY))
            .copied()
            .unwrap_or(0)
    }

    /// Per-user consumption of `account`, excluding the total.
    pub fn users(&self, account: &str) -> impl Iterator<Item = (&str, i64)> {
        self.accounts
            .get(&account_key(account))
            .into_iter()
            .flat_map(|users| users.iter())
            .filter(|(login, _)| login.as_str() != TOTAL_KEY)
            .map(|(login, hours)| (login.as_str(), *hours))
    }

    /// Keep only `accounts`.
    pub fn restricted_to(&self, accounts: &[String]) -> Self {
        let wanted: Vec<String> = accounts.iter().map(|a| account_key(a)).collect();
        Self {
            accounts: self
                .accounts
                .iter()
                .filter(|(name, _)| wanted.contains(name))
                .map(|(name, users)| (name.clone(), users.clone()))
                .collect(),
        }
    }
}

fn parse_line(line: &str) -> Option<UsageRow> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let [_cluster, account, login, _name, used, ..] = fields.as_slice() else {
        return None;
    };
    if account.is_empty() {
        return None;
    }
    let hours = used.parse::<i64>().ok().filter(|h| *h >= 0)?;
    Some(UsageRow {
        account: account.to_string(),
        login: (!login.is_empty()).then(|| login.to_string()),
        hours,
    })
}

/// Parse scheduler output, skipping anything that does not look like data.
pub fn parse_report(output: &str) -> UsageReport {
    let mut skipped = 0usize;
    let rows: Vec<UsageRow> = output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| {
            let row = parse_line(l);
            if row.is_none() {
                skipped += 1;
            }
            row
        })
        .collect();
    if skipped > 0 {
        tracing::debug!(skipped, parsed = rows.len(), "Skipped unparsable accounting lines");
    }
    UsageReport::from_rows(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
Cluster|Account|Login|Proper Name|Used
hpc|a042||A042 project|1520
hpc|a042|alice|Alice Martin|1200
hpc|a042|bob|Bob Stone|320
hpc|b007||B007 project|0
";

    #[test]
    fn parses_totals_and_users() {
        let report = parse_report(OUTPUT);
        assert_eq!(report.total("a042"), 1520);
        assert_eq!(report.total("b007"), 0);
        let users: Vec<_> = report.users("a042").collect();
        assert_eq!(users, vec![("alice", 1200), ("bob", 320)]);
    }

    #[test]
    fn malformed_output_degrades_to_empty() {
        assert!(parse_report("").is_empty());
        assert!(parse_report("error: unable to contact slurmdbd").is_empty());
        assert!(parse_report("hpc|a042||A042|lots").is_empty());
    }

    #[test]
    fn unknown_account_total_is_zero() {
        assert_eq!(parse_report(OUTPUT).total("zzz"), 0);
    }

    #[test]
    fn account_without_total_row_has_no_total_entry() {
        let report = parse_report("hpc|c001|carol|Carol|10\n");
        assert!(report.account("c001").is_some_and(|u| !u.contains_key(TOTAL_KEY)));
        assert_eq!(report.total("c001"), 0);
    }

    #[test]
    fn restriction_keeps_requested_accounts() {
        let report = parse_report(OUTPUT).restricted_to(&["B007".to_string()]);
        assert_eq!(report.accounts().collect::<Vec<_>>(), vec!["b007"]);
    }

    #[test]
    fn project_names_find_lowercase_accounts() {
        let report = parse_report(OUTPUT);
        assert_eq!(report.total("A042"), 1520);
        assert_eq!(report.users("A042").count(), 2);
        assert!(report.account("A042").is_some());

        let mut built = UsageReport::new();
        built.insert("B007", TOTAL_KEY, 12);
        assert_eq!(built.total("b007"), 12);
    }
}
