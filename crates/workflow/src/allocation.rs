//! Allocation resource lifecycle.
//!
//! [`AllocationLifecycle`] owns the per-type [`PolicyConfig`] and turns
//! renewals, extensions, transformations and activations into
//! [`AllocationPlan`]s for the store to apply. It does no I/O.

use hpcalloc_core::error::CoreError;
use hpcalloc_core::naming::retype_name;
use hpcalloc_core::policy::{candidate_ttl, compute_ttl, PolicyConfig, TypePolicy};
use hpcalloc_core::request_kind::{resolve_outcome, Outcome, RequestKind};
use hpcalloc_core::types::{DbId, Timestamp};
use hpcalloc_core::usage::try_usage_percent;
use hpcalloc_core::usage::ZERO_USAGE;
use hpcalloc_db::models::project::{Project, ProjectRetype};

use crate::store::{AllocationChange, AllocationPlan};

static NO_POLICY: TypePolicy = TypePolicy {
    label: None,
    end_date: None,
    duration: None,
    never_extend: false,
    never_renew: false,
};

/// Where a change comes from, recorded on the allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provenance {
    pub approver_id: Option<DbId>,
    pub extension_id: Option<DbId>,
}

#[derive(Debug, Clone, Default)]
pub struct AllocationLifecycle {
    policy: PolicyConfig,
}

impl AllocationLifecycle {
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Policy for `type_code`; unknown types have no overrides.
    pub fn type_policy(&self, type_code: &str) -> &TypePolicy {
        self.policy.type_policy(type_code).unwrap_or(&NO_POLICY)
    }

    /// Expiry of an allocation created at `now` for a project of `type_code`.
    ///
    /// A type without an end date or duration falls back to `now`, which is
    /// logged as critical and then rejected as [`CoreError::PastTtl`].
    pub fn compute_ttl(&self, type_code: &str, now: Timestamp) -> Result<Timestamp, CoreError> {
        let policy = self.policy.type_policy(type_code);
        if candidate_ttl(policy, now).fallback {
            tracing::error!(
                critical = true,
                type_code,
                "No end date or duration configured for project type, TTL falls back to now"
            );
        }
        compute_ttl(policy, now)
    }

    /// Which change an accepted request of `kind` executes on a project of
    /// `type_code`.
    pub fn resolve(&self, kind: &RequestKind, type_code: &str) -> Outcome {
        resolve_outcome(kind, self.type_policy(type_code))
    }

    pub fn renew(
        &self,
        project: &Project,
        hours: i64,
        now: Timestamp,
        from: Provenance,
    ) -> Result<AllocationPlan, CoreError> {
        let ttl = self.compute_ttl(&project.type_code, now)?;
        Ok(plan(
            AllocationChange::Renew { hours, ttl },
            from,
            comment_line(from, format!("Renewed with {hours} hours until {}", ttl.date_naive())),
        ))
    }

    pub fn extend(&self, hours: i64, from: Provenance) -> AllocationPlan {
        plan(
            AllocationChange::Extend { hours },
            from,
            comment_line(from, format!("Extended by {hours} hours")),
        )
    }

    pub fn transform(
        &self,
        project: &Project,
        hours: i64,
        new_type: &str,
        now: Timestamp,
        from: Provenance,
    ) -> Result<AllocationPlan, CoreError> {
        if !self.policy.is_known_type(new_type) {
            return Err(CoreError::invalid(format!("Unknown project type '{new_type}'")));
        }
        let ttl = self.compute_ttl(new_type, now)?;
        let retype = ProjectRetype {
            name: retype_name(&project.name, &project.type_code, new_type),
            type_code: new_type.to_string(),
            type_label: self.policy.label(new_type),
        };
        let line = format!(
            "Transformed from {} to {} with {hours} hours until {}",
            project.type_code,
            new_type,
            ttl.date_naive()
        );
        Ok(plan(
            AllocationChange::Transform { hours, ttl, retype },
            from,
            comment_line(from, line),
        ))
    }

    pub fn activate(
        &self,
        project: &Project,
        hours: i64,
        now: Timestamp,
        from: Provenance,
    ) -> Result<AllocationPlan, CoreError> {
        let ttl = self.compute_ttl(&project.type_code, now)?;
        Ok(plan(
            AllocationChange::Activate { hours, ttl },
            from,
            comment_line(from, format!("Activated with {hours} hours until {}", ttl.date_naive())),
        ))
    }

    /// Plan for executing `outcome` on `project`.
    pub fn plan_outcome(
        &self,
        project: &Project,
        outcome: &Outcome,
        hours: i64,
        now: Timestamp,
        from: Provenance,
    ) -> Result<AllocationPlan, CoreError> {
        match outcome {
            Outcome::Transform { target_type } => {
                self.transform(project, hours, target_type, now, from)
            }
            Outcome::Activate => self.activate(project, hours, now, from),
            Outcome::Renew { .. } => self.renew(project, hours, now, from),
            Outcome::Extend { .. } => Ok(self.extend(hours, from)),
        }
    }

    /// Consumption against a grant as a percentage, `"0%"` when undefined.
    pub fn usage(&self, consumed: i64, granted: i64) -> String {
        match try_usage_percent(consumed, granted) {
            Some(percent) => percent,
            None => {
                tracing::warn!(consumed, granted, "Usage ratio undefined, reporting 0%");
                ZERO_USAGE.to_string()
            }
        }
    }
}

fn plan(change: AllocationChange, from: Provenance, comment: String) -> AllocationPlan {
    AllocationPlan {
        change,
        approver_id: from.approver_id,
        extension_id: from.extension_id,
        comment,
    }
}

fn comment_line(from: Provenance, text: String) -> String {
    match from.extension_id {
        Some(id) => format!("Request #{id}: {text}"),
        None => text,
    }
}
