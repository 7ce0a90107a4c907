//! Audit log categories and subject kinds.
//!
//! This module lives in `core` (zero internal deps) so the workflow engine,
//! the repository layer and the notification dispatcher agree on the exact
//! strings persisted in `log_events.category`.

/// Known audit categories.
pub mod categories {
    pub const SUBMITTED: &str = "submitted";
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
    pub const IGNORED: &str = "ignored";
    pub const EXTENDED: &str = "extended";
    pub const RENEWED: &str = "renewed";
    pub const TRANSFORMED: &str = "transformed";
    pub const ACTIVATED: &str = "activated";
    pub const APPROVED: &str = "approved";
    pub const VISA_SENT: &str = "visa_sent";
    pub const VISA_SKIPPED: &str = "visa_skipped";
    pub const PROJECT_CREATED: &str = "project_created";
    pub const TASK_QUEUED: &str = "task_queued";
    pub const TASK_DONE: &str = "task_done";
    pub const EXPIRY_WARNING: &str = "expiry_warning";
    pub const SUSPENDED: &str = "suspended";
    pub const USAGE_COLLECTED: &str = "usage_collected";
}

/// Every category the engine may record.
pub const ALL_CATEGORIES: &[&str] = &[
    categories::SUBMITTED,
    categories::ACCEPTED,
    categories::REJECTED,
    categories::IGNORED,
    categories::EXTENDED,
    categories::RENEWED,
    categories::TRANSFORMED,
    categories::ACTIVATED,
    categories::APPROVED,
    categories::VISA_SENT,
    categories::VISA_SKIPPED,
    categories::PROJECT_CREATED,
    categories::TASK_QUEUED,
    categories::TASK_DONE,
    categories::EXPIRY_WARNING,
    categories::SUSPENDED,
    categories::USAGE_COLLECTED,
];

/// Whether `category` is one the engine knows about.
pub fn is_known_category(category: &str) -> bool {
    ALL_CATEGORIES.contains(&category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_unique() {
        let mut sorted = ALL_CATEGORIES.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ALL_CATEGORIES.len());
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!(is_known_category(categories::EXTENDED));
        assert!(!is_known_category("deleted"));
    }
}
