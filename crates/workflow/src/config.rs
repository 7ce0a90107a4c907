use std::path::PathBuf;

use hpcalloc_core::error::CoreError;
use hpcalloc_core::policy::PolicyConfig;

/// Engine settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address told about approvals and new requests.
    pub technical_email: Option<String>,
    /// Copied on decisions sent to project responsibles.
    pub admin_cc: Vec<String>,
    /// JSON [`PolicyConfig`] document.
    pub policy_path: Option<PathBuf>,
    /// Where rendered documents are written.
    pub document_dir: PathBuf,
    /// Look-ahead window of the expiry warning sweep.
    pub expiry_warn_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            technical_email: None,
            admin_cc: Vec::new(),
            policy_path: None,
            document_dir: PathBuf::from("documents"),
            expiry_warn_days: 14,
        }
    }
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma-separated address list.
pub fn parse_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var            | Default     |
    /// |--------------------|-------------|
    /// | `TECHNICAL_EMAIL`  | (none)      |
    /// | `ADMIN_CC`         | (none)      |
    /// | `POLICY_CONFIG`    | (none)      |
    /// | `DOCUMENT_DIR`     | `documents` |
    /// | `EXPIRY_WARN_DAYS` | `14`        |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        let expiry_warn_days = match non_empty("EXPIRY_WARN_DAYS") {
            Some(raw) => raw.parse().map_err(|_| {
                CoreError::Configuration(format!("EXPIRY_WARN_DAYS must be an integer, got '{raw}'"))
            })?,
            None => defaults.expiry_warn_days,
        };

        Ok(Self {
            technical_email: non_empty("TECHNICAL_EMAIL"),
            admin_cc: non_empty("ADMIN_CC")
                .map(|raw| parse_address_list(&raw))
                .unwrap_or_default(),
            policy_path: non_empty("POLICY_CONFIG").map(PathBuf::from),
            document_dir: non_empty("DOCUMENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.document_dir),
            expiry_warn_days,
        })
    }

    /// Read the policy document, or an empty policy when none is configured.
    pub fn load_policy(&self) -> Result<PolicyConfig, CoreError> {
        let Some(path) = &self.policy_path else {
            tracing::warn!("POLICY_CONFIG not set, every project type lacks a TTL policy");
            return Ok(PolicyConfig::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("Cannot read {}: {e}", path.display()))
        })?;
        PolicyConfig::from_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_list_skips_blanks() {
        assert_eq!(
            parse_address_list(" a@x.org, ,b@x.org,"),
            vec!["a@x.org".to_string(), "b@x.org".to_string()]
        );
    }

    #[test]
    fn missing_policy_path_gives_empty_policy() {
        let policy = EngineConfig::default().load_policy().unwrap();
        assert!(policy.types.is_empty());
    }

    #[test]
    fn unreadable_policy_is_a_configuration_error() {
        let config = EngineConfig {
            policy_path: Some(PathBuf::from("/nonexistent/policy.json")),
            ..EngineConfig::default()
        };
        assert!(matches!(config.load_policy(), Err(CoreError::Configuration(_))));
    }
}
