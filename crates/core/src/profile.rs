//! Editable user profile fields and staged-change diffing.
//!
//! Profile edits are staged until an administrator completes the matching
//! "update user" task. [`diff_profiles`] computes exactly which fields the
//! staged copy changes.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// The user fields a profile edit may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UserProfile {
    #[validate(length(min = 1, max = 128))]
    pub first_name: String,
    #[validate(length(min = 1, max = 128))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 64))]
    pub phone: Option<String>,
    #[validate(length(max = 256))]
    pub lab: Option<String>,
    #[validate(length(max = 128))]
    pub position: Option<String>,
}

/// Identifies one editable profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    FirstName,
    LastName,
    Email,
    Phone,
    Lab,
    Position,
}

impl ProfileField {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileField::FirstName => "first_name",
            ProfileField::LastName => "last_name",
            ProfileField::Email => "email",
            ProfileField::Phone => "phone",
            ProfileField::Lab => "lab",
            ProfileField::Position => "position",
        }
    }
}

/// A single changed field with its old and new rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: ProfileField,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Ordered set of changed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileChangeSet {
    pub changes: Vec<FieldChange>,
}

impl ProfileChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Summary such as `"email: a@x -> b@x; lab: - -> HPC"`.
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            return "no changes".to_string();
        }
        self.changes
            .iter()
            .map(|c| {
                format!(
                    "{}: {} -> {}",
                    c.field.as_str(),
                    c.old.as_deref().unwrap_or("-"),
                    c.new.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Compare the live profile against a staged edit.
pub fn diff_profiles(current: &UserProfile, staged: &UserProfile) -> ProfileChangeSet {
    let mut changes = Vec::new();
    let mut push = |field, old: Option<&str>, new: Option<&str>| {
        if old != new {
            changes.push(FieldChange {
                field,
                old: old.map(str::to_string),
                new: new.map(str::to_string),
            });
        }
    };

    push(
        ProfileField::FirstName,
        Some(&current.first_name),
        Some(&staged.first_name),
    );
    push(
        ProfileField::LastName,
        Some(&current.last_name),
        Some(&staged.last_name),
    );
    push(ProfileField::Email, Some(&current.email), Some(&staged.email));
    push(ProfileField::Phone, current.phone.as_deref(), staged.phone.as_deref());
    push(ProfileField::Lab, current.lab.as_deref(), staged.lab.as_deref());
    push(
        ProfileField::Position,
        current.position.as_deref(),
        staged.position.as_deref(),
    );

    ProfileChangeSet { changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserProfile {
        UserProfile {
            first_name: "Alice".into(),
            last_name: "Martin".into(),
            email: "alice@lab.example".into(),
            phone: None,
            lab: Some("LMA".into()),
            position: None,
        }
    }

    #[test]
    fn identical_profiles_have_no_changes() {
        let diff = diff_profiles(&alice(), &alice());
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "no changes");
    }

    #[test]
    fn reports_only_changed_fields_in_order() {
        let mut staged = alice();
        staged.email = "alice@new.example".into();
        staged.phone = Some("+33 1 23".into());

        let diff = diff_profiles(&alice(), &staged);
        let fields: Vec<_> = diff.changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec![ProfileField::Email, ProfileField::Phone]);
        assert_eq!(
            diff.summary(),
            "email: alice@lab.example -> alice@new.example; phone: - -> +33 1 23"
        );
    }

    #[test]
    fn clearing_an_optional_field_is_a_change() {
        let mut staged = alice();
        staged.lab = None;
        let diff = diff_profiles(&alice(), &staged);
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].new, None);
    }

    #[test]
    fn invalid_email_fails_validation() {
        let mut profile = alice();
        profile.email = "not-an-email".into();
        assert!(profile.validate().is_err());
        assert!(alice().validate().is_ok());
    }
}
