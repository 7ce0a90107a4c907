//! Administrative task action descriptors.
//!
//! Every queued task carries one [`TaskAction`]. Its pipe-delimited
//! encoding (`verb|target|user_id[|project_id]`) is the natural key used to
//! reject duplicate pending tasks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// A queued administrative mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskAction {
    /// Activate a pre-registered user and add them to a project.
    CreateUser { user_id: DbId, project_id: DbId },
    /// Activate a pre-registered user and make them responsible of a project.
    CreateResponsible { user_id: DbId, project_id: DbId },
    AssignUser { user_id: DbId, project_id: DbId },
    RemoveUser { user_id: DbId, project_id: DbId },
    AssignResponsible { user_id: DbId, project_id: DbId },
    /// Apply the user's staged profile edit.
    UpdateUser { user_id: DbId },
    PasswordReset { user_id: DbId },
    SshKeyUpload { user_id: DbId },
}

impl TaskAction {
    /// The user the action is about.
    pub fn user_id(&self) -> DbId {
        match *self {
            TaskAction::CreateUser { user_id, .. }
            | TaskAction::CreateResponsible { user_id, .. }
            | TaskAction::AssignUser { user_id, .. }
            | TaskAction::RemoveUser { user_id, .. }
            | TaskAction::AssignResponsible { user_id, .. }
            | TaskAction::UpdateUser { user_id }
            | TaskAction::PasswordReset { user_id }
            | TaskAction::SshKeyUpload { user_id } => user_id,
        }
    }

    /// The project the action is about, if any.
    pub fn project_id(&self) -> Option<DbId> {
        match *self {
            TaskAction::CreateUser { project_id, .. }
            | TaskAction::CreateResponsible { project_id, .. }
            | TaskAction::AssignUser { project_id, .. }
            | TaskAction::RemoveUser { project_id, .. }
            | TaskAction::AssignResponsible { project_id, .. } => Some(project_id),
            TaskAction::UpdateUser { .. }
            | TaskAction::PasswordReset { .. }
            | TaskAction::SshKeyUpload { .. } => None,
        }
    }

    fn verb_target(&self) -> (&'static str, &'static str) {
        match self {
            TaskAction::CreateUser { .. } => ("create", "user"),
            TaskAction::CreateResponsible { .. } => ("create", "responsible"),
            TaskAction::AssignUser { .. } => ("assign", "user"),
            TaskAction::RemoveUser { .. } => ("remove", "user"),
            TaskAction::AssignResponsible { .. } => ("assign", "responsible"),
            TaskAction::UpdateUser { .. } => ("update", "user"),
            TaskAction::PasswordReset { .. } => ("password", "user"),
            TaskAction::SshKeyUpload { .. } => ("key", "user"),
        }
    }

    /// Human-readable summary used in notifications.
    pub fn describe(&self) -> String {
        let (verb, target) = self.verb_target();
        match self.project_id() {
            Some(p) => format!("{verb} {target} {} (project {p})", self.user_id()),
            None => format!("{verb} {target} {}", self.user_id()),
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, target) = self.verb_target();
        match self.project_id() {
            Some(p) => write!(f, "{verb}|{target}|{}|{p}", self.user_id()),
            None => write!(f, "{verb}|{target}|{}", self.user_id()),
        }
    }
}

fn parse_id(raw: &str, descriptor: &str) -> Result<DbId, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::invalid(format!("Invalid id '{raw}' in task action '{descriptor}'")))
}

impl FromStr for TaskAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        let action = match parts.as_slice() {
            [verb, target, user, project] => {
                let user_id = parse_id(user, s)?;
                let project_id = parse_id(project, s)?;
                match (*verb, *target) {
                    ("create", "user") => TaskAction::CreateUser { user_id, project_id },
                    ("create", "responsible") => TaskAction::CreateResponsible { user_id, project_id },
                    ("assign", "user") => TaskAction::AssignUser { user_id, project_id },
                    ("remove", "user") => TaskAction::RemoveUser { user_id, project_id },
                    ("assign", "responsible") => TaskAction::AssignResponsible { user_id, project_id },
                    _ => return Err(CoreError::invalid(format!("Unknown task action '{s}'"))),
                }
            }
            [verb, "user", user] => {
                let user_id = parse_id(user, s)?;
                match *verb {
                    "update" => TaskAction::UpdateUser { user_id },
                    "password" => TaskAction::PasswordReset { user_id },
                    "key" => TaskAction::SshKeyUpload { user_id },
                    _ => return Err(CoreError::invalid(format!("Unknown task action '{s}'"))),
                }
            }
            _ => return Err(CoreError::invalid(format!("Malformed task action '{s}'"))),
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_encodes_project_actions() {
        let action = TaskAction::AssignResponsible {
            user_id: 4,
            project_id: 17,
        };
        assert_eq!(action.to_string(), "assign|responsible|4|17");
        assert_eq!(action.project_id(), Some(17));
    }

    #[test]
    fn descriptor_encodes_user_actions() {
        let action = TaskAction::PasswordReset { user_id: 8 };
        assert_eq!(action.to_string(), "password|user|8");
        assert_eq!(action.project_id(), None);
        assert_eq!(action.user_id(), 8);
    }

    #[test]
    fn every_descriptor_parses_back() {
        let actions = [
            TaskAction::CreateUser { user_id: 1, project_id: 2 },
            TaskAction::CreateResponsible { user_id: 1, project_id: 2 },
            TaskAction::RemoveUser { user_id: 1, project_id: 2 },
            TaskAction::UpdateUser { user_id: 3 },
            TaskAction::SshKeyUpload { user_id: 3 },
        ];
        for action in actions {
            assert_eq!(action.to_string().parse::<TaskAction>().unwrap(), action);
        }
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        assert!("assign|user|x|2".parse::<TaskAction>().is_err());
        assert!("delete|user|1|2".parse::<TaskAction>().is_err());
        assert!("update|project|1".parse::<TaskAction>().is_err());
        assert!("".parse::<TaskAction>().is_err());
    }

    #[test]
    fn describe_mentions_project() {
        let action = TaskAction::CreateUser { user_id: 5, project_id: 9 };
        assert_eq!(action.describe(), "create user 5 (project 9)");
    }
}
