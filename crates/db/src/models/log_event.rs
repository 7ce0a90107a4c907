//! Audit trail models. Log events are immutable once written.

use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `log_events` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LogEvent {
    pub id: DbId,
    pub actor_id: Option<DbId>,
    pub category: String,
    pub event: String,
    pub project_id: Option<DbId>,
    pub user_id: Option<DbId>,
    pub extension_id: Option<DbId>,
    pub registration_id: Option<DbId>,
    pub task_id: Option<DbId>,
    pub created_at: Timestamp,
}

/// DTO for appending an audit entry.
///
/// Entity references left `None` are filled in by the store when the entry
/// is written together with a freshly inserted row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateLogEvent {
    pub actor_id: Option<DbId>,
    pub category: String,
    pub event: String,
    pub project_id: Option<DbId>,
    pub user_id: Option<DbId>,
    pub extension_id: Option<DbId>,
    pub registration_id: Option<DbId>,
    pub task_id: Option<DbId>,
}

impl CreateLogEvent {
    pub fn new(actor_id: Option<DbId>, category: &str, event: impl Into<String>) -> Self {
        Self {
            actor_id,
            category: category.to_string(),
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn for_project(mut self, id: DbId) -> Self {
        self.project_id = Some(id);
        self
    }

    pub fn for_user(mut self, id: DbId) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn for_extension(mut self, id: DbId) -> Self {
        self.extension_id = Some(id);
        self
    }

    pub fn for_registration(mut self, id: DbId) -> Self {
        self.registration_id = Some(id);
        self
    }

    pub fn for_task(mut self, id: DbId) -> Self {
        self.task_id = Some(id);
        self
    }

    // Fillers used by stores once ids are known; explicit values win.

    pub fn or_project(mut self, id: DbId) -> Self {
        self.project_id.get_or_insert(id);
        self
    }

    pub fn or_user(mut self, id: DbId) -> Self {
        self.user_id.get_or_insert(id);
        self
    }

    pub fn or_extension(mut self, id: DbId) -> Self {
        self.extension_id.get_or_insert(id);
        self
    }

    pub fn or_registration(mut self, id: DbId) -> Self {
        self.registration_id.get_or_insert(id);
        self
    }

    pub fn or_task(mut self, id: DbId) -> Self {
        self.task_id.get_or_insert(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fillers_do_not_override_explicit_references() {
        let entry = CreateLogEvent::new(Some(1), "accepted", "Extension 3 accepted")
            .for_project(7)
            .or_project(9)
            .or_extension(3);
        assert_eq!(entry.project_id, Some(7));
        assert_eq!(entry.extension_id, Some(3));
        assert_eq!(entry.task_id, None);
    }
}

/// History filter. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogEventQuery {
    pub project_id: Option<DbId>,
    pub extension_id: Option<DbId>,
    pub registration_id: Option<DbId>,
    pub task_id: Option<DbId>,
    pub category: Option<String>,
}

impl LogEventQuery {
    pub fn matches(&self, event: &LogEvent) -> bool {
        fn eq(filter: Option<DbId>, value: Option<DbId>) -> bool {
            filter.is_none() || filter == value
        }
        eq(self.project_id, event.project_id)
            && eq(self.extension_id, event.extension_id)
            && eq(self.registration_id, event.registration_id)
            && eq(self.task_id, event.task_id)
            && self
                .category
                .as_deref()
                .map_or(true, |c| c == event.category)
    }
}
