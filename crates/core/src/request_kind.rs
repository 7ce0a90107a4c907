//! Allocation-change request kinds and execution precedence.
//!
//! A request is exactly one of renewal, extension, transformation or
//! activation. Per-type policy may force a renewal or an extension
//! regardless of what was asked for; [`resolve_outcome`] is the single place
//! where the precedence between the two is decided.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::policy::TypePolicy;

/// Database value for [`RequestKind::Renewal`].
pub const KIND_RENEWAL: &str = "renewal";
/// Database value for [`RequestKind::Extension`].
pub const KIND_EXTENSION: &str = "extension";
/// Database value for [`RequestKind::Transform`].
pub const KIND_TRANSFORM: &str = "transform";
/// Database value for [`RequestKind::Activation`].
pub const KIND_ACTIVATION: &str = "activation";

/// All valid kind values.
pub const VALID_KINDS: &[&str] = &[KIND_RENEWAL, KIND_EXTENSION, KIND_TRANSFORM, KIND_ACTIVATION];

/// What an allocation-change request asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    /// Replace the current allocation with a fresh one.
    Renewal,
    /// Add hours to the current allocation in place.
    Extension,
    /// Move the project to another type with a fresh allocation.
    Transform { target_type: String },
    /// Re-activate a suspended project with a fresh allocation.
    Activation,
}

impl RequestKind {
    /// Build a kind from the submission flags of a request form.
    ///
    /// A non-empty transform target wins over activation, which wins over
    /// the extend flag.
    pub fn from_flags(extend: bool, transform: Option<&str>, activate: bool) -> Self {
        match transform.map(str::trim).filter(|t| !t.is_empty()) {
            Some(target) => RequestKind::Transform {
                target_type: target.to_string(),
            },
            None if activate => RequestKind::Activation,
            None if extend => RequestKind::Extension,
            None => RequestKind::Renewal,
        }
    }

    /// Decode the `kind` / `transform_type` column pair.
    pub fn from_parts(kind: &str, transform_type: Option<&str>) -> Result<Self, CoreError> {
        match kind {
            KIND_RENEWAL => Ok(RequestKind::Renewal),
            KIND_EXTENSION => Ok(RequestKind::Extension),
            KIND_ACTIVATION => Ok(RequestKind::Activation),
            KIND_TRANSFORM => match transform_type.filter(|t| !t.is_empty()) {
                Some(t) => Ok(RequestKind::Transform {
                    target_type: t.to_string(),
                }),
                None => Err(CoreError::invalid(
                    "Transform request is missing its target type",
                )),
            },
            other => Err(CoreError::invalid(format!(
                "Invalid request kind '{other}'. Must be one of: {}",
                VALID_KINDS.join(", ")
            ))),
        }
    }

    /// The `kind` column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Renewal => KIND_RENEWAL,
            RequestKind::Extension => KIND_EXTENSION,
            RequestKind::Transform { .. } => KIND_TRANSFORM,
            RequestKind::Activation => KIND_ACTIVATION,
        }
    }

    /// The `transform_type` column value.
    pub fn transform_type(&self) -> Option<&str> {
        match self {
            RequestKind::Transform { target_type } => Some(target_type),
            _ => None,
        }
    }

    /// Apply a manual override of the extend flag.
    ///
    /// Only renewals and extensions are affected; transforms and
    /// activations keep their kind.
    pub fn with_extend_override(self, extend: bool) -> Self {
        match self {
            RequestKind::Renewal | RequestKind::Extension if extend => RequestKind::Extension,
            RequestKind::Renewal | RequestKind::Extension => RequestKind::Renewal,
            other => other,
        }
    }
}

/// The concrete change executed for an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transform { target_type: String },
    Activate,
    /// `forced` is set when the project type never allows extensions.
    Renew { forced: bool },
    /// `forced` is set when the project type never allows renewals.
    Extend { forced: bool },
}

impl Outcome {
    /// Audit category recorded when the outcome is executed.
    pub fn category(&self) -> &'static str {
        match self {
            Outcome::Transform { .. } => crate::audit::categories::TRANSFORMED,
            Outcome::Activate => crate::audit::categories::ACTIVATED,
            Outcome::Renew { .. } => crate::audit::categories::RENEWED,
            Outcome::Extend { .. } => crate::audit::categories::EXTENDED,
        }
    }
}

/// Decide which outcome an accepted request executes.
///
/// Precedence: transform, activation, type-forced renewal, type-forced
/// extension, then the requested renewal or extension.
pub fn resolve_outcome(kind: &RequestKind, policy: &TypePolicy) -> Outcome {
    match kind {
        RequestKind::Transform { target_type } => Outcome::Transform {
            target_type: target_type.clone(),
        },
        RequestKind::Activation => Outcome::Activate,
        _ if policy.never_extend => Outcome::Renew { forced: true },
        _ if policy.never_renew => Outcome::Extend { forced: true },
        RequestKind::Renewal => Outcome::Renew { forced: false },
        RequestKind::Extension => Outcome::Extend { forced: false },
    }
}
