//! Per-project-type allocation policy and TTL computation.
//!
//! A [`PolicyConfig`] is built once at startup (usually from a JSON file)
//! and handed to the allocation lifecycle. Each project type may define a
//! fixed end date, a relative duration, and whether it is ever allowed to
//! be extended or renewed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Days, Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{start_of_day, Timestamp};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\+?\s*(\d+)\s*(day|days|week|weeks|month|months|year|years)$")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Relative durations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Days,
    Weeks,
    Months,
    Years,
}

/// A calendar-aware relative duration such as `+6 months`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DurationSpec {
    pub amount: u32,
    pub unit: DurationUnit,
}

impl DurationSpec {
    pub fn months(amount: u32) -> Self {
        Self {
            amount,
            unit: DurationUnit::Months,
        }
    }

    /// Add the duration to `from`, clamping month ends the way chrono does.
    ///
    /// Returns `None` on calendar overflow.
    pub fn add_to(&self, from: Timestamp) -> Option<Timestamp> {
        let n = u64::from(self.amount);
        match self.unit {
            DurationUnit::Days => from.checked_add_days(Days::new(n)),
            DurationUnit::Weeks => from.checked_add_days(Days::new(n * 7)),
            DurationUnit::Months => from.checked_add_months(Months::new(self.amount)),
            DurationUnit::Years => from.checked_add_months(Months::new(self.amount.checked_mul(12)?)),
        }
    }
}

impl FromStr for DurationSpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DURATION_RE.captures(s.trim()).ok_or_else(|| {
            CoreError::Configuration(format!(
                "Invalid duration '{s}'. Expected e.g. '+6 months', '1 year', '90 days'"
            ))
        })?;
        let amount: u32 = caps[1]
            .parse()
            .map_err(|_| CoreError::Configuration(format!("Duration amount out of range: '{s}'")))?;
        let unit = match caps[2].to_ascii_lowercase().trim_end_matches('s') {
            "day" => DurationUnit::Days,
            "week" => DurationUnit::Weeks,
            "month" => DurationUnit::Months,
            _ => DurationUnit::Years,
        };
        Ok(Self { amount, unit })
    }
}

impl TryFrom<String> for DurationSpec {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            DurationUnit::Days => "days",
            DurationUnit::Weeks => "weeks",
            DurationUnit::Months => "months",
            DurationUnit::Years => "years",
        };
        write!(f, "+{} {unit}", self.amount)
    }
}

impl From<DurationSpec> for String {
    fn from(value: DurationSpec) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Policy configuration
// ---------------------------------------------------------------------------

/// Policy for a single project type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePolicy {
    /// Display label used as the project's type name.
    #[serde(default)]
    pub label: Option<String>,
    /// Fixed expiry date shared by every allocation of this type.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Validity window relative to the allocation's creation.
    #[serde(default)]
    pub duration: Option<DurationSpec>,
    /// Requests for this type are always executed as renewals.
    #[serde(default)]
    pub never_extend: bool,
    /// Requests for this type are always executed as extensions.
    #[serde(default)]
    pub never_renew: bool,
}

/// Allocation policy keyed by project type code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub types: HashMap<String, TypePolicy>,
}

impl PolicyConfig {
    /// Parse a policy document.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw)
            .map_err(|e| CoreError::Configuration(format!("Invalid policy document: {e}")))
    }

    /// Policy for `type_code`, if configured.
    pub fn type_policy(&self, type_code: &str) -> Option<&TypePolicy> {
        self.types.get(type_code)
    }

    /// Whether `type_code` is a configured project type.
    pub fn is_known_type(&self, type_code: &str) -> bool {
        self.types.contains_key(type_code)
    }

    /// Display label for `type_code`, falling back to the code itself.
    pub fn label(&self, type_code: &str) -> String {
        self.type_policy(type_code)
            .and_then(|p| p.label.clone())
            .unwrap_or_else(|| type_code.to_string())
    }
}

// ---------------------------------------------------------------------------
// TTL computation
// ---------------------------------------------------------------------------

/// The raw expiry derived from a type policy, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlCandidate {
    pub ttl: Timestamp,
    /// Set when neither an end date nor a duration was configured and the
    /// candidate fell back to `now`.
    pub fallback: bool,
}

/// Derive the expiry for a new allocation created at `now`.
///
/// With both a fixed date and a duration the later one wins; with only one,
/// that one is used; with neither, the candidate is `now` itself.
pub fn candidate_ttl(policy: Option<&TypePolicy>, now: Timestamp) -> TtlCandidate {
    let fixed = policy.and_then(|p| p.end_date).map(start_of_day);
    let relative = policy
        .and_then(|p| p.duration)
        .and_then(|d| d.add_to(now));

    match (fixed, relative) {
        (Some(a), Some(b)) => TtlCandidate {
            ttl: a.max(b),
            fallback: false,
        },
        (Some(ttl), None) | (None, Some(ttl)) => TtlCandidate {
            ttl,
            fallback: false,
        },
        (None, None) => TtlCandidate {
            ttl: now,
            fallback: true,
        },
    }
}

/// Compute and validate the expiry for a new allocation.
///
/// Fails with [`CoreError::PastTtl`] when the expiry is not strictly after
/// `now`, which includes the no-configuration fallback.
pub fn compute_ttl(policy: Option<&TypePolicy>, now: Timestamp) -> Result<Timestamp, CoreError> {
    let candidate = candidate_ttl(policy, now);
    if candidate.ttl <= now {
        return Err(CoreError::PastTtl {
            ttl: candidate.ttl,
            now,
        });
    }
    Ok(candidate.ttl)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn jan_10() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_duration_forms() {
        assert_eq!("+6 months".parse::<DurationSpec>().unwrap(), DurationSpec::months(6));
        assert_eq!(
            "1 year".parse::<DurationSpec>().unwrap().unit,
            DurationUnit::Years
        );
        assert_eq!("90days".parse::<DurationSpec>().unwrap().amount, 90);
        assert_eq!(
            "2 Weeks".parse::<DurationSpec>().unwrap().unit,
            DurationUnit::Weeks
        );
    }

    #[test]
    fn rejects_malformed_duration() {
        assert_matches!("six months".parse::<DurationSpec>(), Err(CoreError::Configuration(_)));
        assert!("-3 days".parse::<DurationSpec>().is_err());
    }

    #[test]
    fn duration_only_adds_calendar_months() {
        let policy = TypePolicy {
            duration: Some(DurationSpec::months(6)),
            ..TypePolicy::default()
        };
        let ttl = compute_ttl(Some(&policy), jan_10()).unwrap();
        assert_eq!(ttl.date_naive(), date(2024, 7, 10));
    }

    #[test]
    fn later_of_fixed_date_and_duration_wins() {
        let policy = TypePolicy {
            end_date: Some(date(2024, 12, 31)),
            duration: Some(DurationSpec::months(6)),
            ..TypePolicy::default()
        };
        let ttl = compute_ttl(Some(&policy), jan_10()).unwrap();
        assert_eq!(ttl.date_naive(), date(2024, 12, 31));
    }

    #[test]
    fn duration_later_than_fixed_date_wins() {
        let policy = TypePolicy {
            end_date: Some(date(2024, 3, 1)),
            duration: Some(DurationSpec::months(6)),
            ..TypePolicy::default()
        };
        let ttl = compute_ttl(Some(&policy), jan_10()).unwrap();
        assert_eq!(ttl.date_naive(), date(2024, 7, 10));
    }

    #[test]
    fn no_configuration_falls_back_to_now_and_fails() {
        let candidate = candidate_ttl(None, jan_10());
        assert!(candidate.fallback);
        assert_eq!(candidate.ttl, jan_10());
        assert_matches!(
            compute_ttl(Some(&TypePolicy::default()), jan_10()),
            Err(CoreError::PastTtl { ttl, .. }) if ttl == jan_10()
        );
    }

    #[test]
    fn fixed_date_in_the_past_is_rejected() {
        let policy = TypePolicy {
            end_date: Some(date(2023, 12, 31)),
            ..TypePolicy::default()
        };
        assert_matches!(compute_ttl(Some(&policy), jan_10()), Err(CoreError::PastTtl { .. }));
    }

    #[test]
    fn policy_document_parses_from_json() {
        let raw = r#"{
            "types": {
                "a": { "label": "Regular", "duration": "+1 year" },
                "p": { "label": "Preparatory", "end_date": "2024-12-31", "never_extend": true }
            }
        }"#;
        let config = PolicyConfig::from_json(raw).unwrap();
        assert_eq!(config.label("a"), "Regular");
        assert_eq!(config.label("zz"), "zz");
        assert!(config.type_policy("p").unwrap().never_extend);
        assert_eq!(
            config.type_policy("a").unwrap().duration,
            Some(DurationSpec {
                amount: 1,
                unit: DurationUnit::Years
            })
        );
    }

    #[test]
    fn bad_policy_document_is_a_configuration_error() {
        assert_matches!(
            PolicyConfig::from_json(r#"{"types": {"a": {"duration": "soon"}}}"#),
            Err(CoreError::Configuration(_))
        );
    }
}
