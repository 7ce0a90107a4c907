//! Notification messages sent by the workflow.
//!
//! Builders only; recipients are resolved by the engine and delivery
//! happens in the dispatcher after commit.

use std::path::PathBuf;

use hpcalloc_db::models::extension::ExtensionRequest;
use hpcalloc_db::models::project::Project;
use hpcalloc_db::models::registration::Registration;
use hpcalloc_db::models::resource::Resource;
use hpcalloc_db::models::task::Task;
use hpcalloc_events::Notification;

/// Message used when a request is ignored.
pub const IGNORED_NOTE: &str = "Request ignored by the allocation committee";

fn request_label(ext: &ExtensionRequest) -> String {
    match &ext.transform_type {
        Some(target) => format!("{} to type {target}", ext.kind),
        None => ext.kind.clone(),
    }
}

// ---------------------------------------------------------------------------
// Extension requests
// ---------------------------------------------------------------------------

pub fn extension_submitted(to: &str, project: &Project, ext: &ExtensionRequest) -> Notification {
    let mut body = format!(
        "A {} request for {} hours was submitted for project {}.\n\nReason:\n{}\n\nCurrent use: {} of {} hours ({}).",
        request_label(ext),
        ext.hours,
        project.name,
        ext.reason,
        ext.present_use,
        ext.present_total,
        ext.usage_percent
    );
    if ext.exceptional {
        body.push_str("\nThe request is marked as exceptional.");
    }
    Notification::new(
        to,
        format!("{}: new {} request", project.name, ext.kind),
        body,
    )
}

pub fn extension_accepted(
    to: &str,
    cc: &[String],
    project: &Project,
    ext: &ExtensionRequest,
) -> Notification {
    let mut body = format!(
        "Your {} request for project {} ({} hours) has been accepted.",
        request_label(ext),
        project.name,
        ext.hours
    );
    if let Some(note) = &ext.decision {
        body.push_str(&format!("\n\n{note}"));
    }
    Notification::new(
        to,
        format!("{}: {} request accepted", project.name, ext.kind),
        body,
    )
    .with_cc(cc.iter().cloned())
}

pub fn extension_rejected(
    to: &str,
    cc: &[String],
    project: &Project,
    ext: &ExtensionRequest,
) -> Notification {
    Notification::new(
        to,
        format!("{}: {} request rejected", project.name, ext.kind),
        format!(
            "Your {} request for project {} has been rejected.\n\n{}",
            request_label(ext),
            project.name,
            ext.decision.as_deref().unwrap_or("")
        ),
    )
    .with_cc(cc.iter().cloned())
}

pub fn extension_ignored(to: &str, project: &Project, ext: &ExtensionRequest) -> Notification {
    Notification::new(
        to,
        format!("{}: {} request closed", project.name, ext.kind),
        format!(
            "Your {} request for project {} was closed without decision.\n\n{IGNORED_NOTE}.",
            request_label(ext),
            project.name
        ),
    )
}

// ---------------------------------------------------------------------------
// Registrations
// ---------------------------------------------------------------------------

pub fn registration_submitted(to: &str, reg: &Registration) -> Notification {
    Notification::new(
        to,
        format!("New project registration #{}", reg.id),
        format!(
            "\"{}\" ({} hours, type {}) was submitted by {} {} <{}>.",
            reg.title,
            reg.cpu_hours,
            reg.type_code,
            reg.responsible_first_name,
            reg.responsible_last_name,
            reg.responsible_email
        ),
    )
}

pub fn registration_approved(to: &str, reg: &Registration) -> Notification {
    Notification::new(
        to,
        format!("Registration #{} approved", reg.id),
        format!(
            "Registration \"{}\" passed the technical review and awaits its visa.",
            reg.title
        ),
    )
}

pub fn visa(reg: &Registration, document: PathBuf) -> Notification {
    Notification::new(
        reg.responsible_email.clone(),
        format!("Visa for project registration \"{}\"", reg.title),
        format!(
            "Dear {} {},\n\nPlease find attached the visa for your registration \"{}\". \
             Return it signed to complete the application.",
            reg.responsible_first_name, reg.responsible_last_name, reg.title
        ),
    )
    .with_attachment(document)
}

pub fn registration_accepted(
    cc: &[String],
    reg: &Registration,
    project: &Project,
    resource: &Resource,
) -> Notification {
    Notification::new(
        reg.responsible_email.clone(),
        format!("Project {} accepted", project.name),
        format!(
            "Your registration \"{}\" was accepted by the committee.\n\n\
             Project: {}\nAllocation: {} hours\nValid until: {}",
            reg.title,
            project.name,
            resource.cpu,
            resource.ttl.date_naive()
        ),
    )
    .with_cc(cc.iter().cloned())
}

pub fn registration_rejected(cc: &[String], reg: &Registration) -> Notification {
    let mut body = format!(
        "Your registration \"{}\" was not accepted by the committee.",
        reg.title
    );
    if let Some(note) = &reg.decision {
        body.push_str(&format!("\n\n{note}"));
    }
    Notification::new(
        reg.responsible_email.clone(),
        format!("Registration \"{}\" rejected", reg.title),
        body,
    )
    .with_cc(cc.iter().cloned())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub fn task_decided(to: &str, task: &Task, description: &str) -> Notification {
    let decision = task.decision.as_deref().unwrap_or("processed");
    Notification::new(
        to,
        format!("Task #{} {decision}", task.id),
        format!("Your request to {description} was {decision}ed."),
    )
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

pub fn expiry_warning(to: &str, cc: &[String], project: &Project, resource: &Resource) -> Notification {
    Notification::new(
        to,
        format!("{}: allocation expires on {}", project.name, resource.ttl.date_naive()),
        format!(
            "The {} hour allocation of project {} expires on {}. \
             Submit a renewal request to keep computing.",
            resource.cpu,
            project.name,
            resource.ttl.date_naive()
        ),
    )
    .with_cc(cc.iter().cloned())
}

pub fn suspended(to: &str, cc: &[String], project: &Project) -> Notification {
    Notification::new(
        to,
        format!("{}: project suspended", project.name),
        format!(
            "The allocation of project {} has expired and the project was suspended. \
             Submit an activation request to resume.",
            project.name
        ),
    )
    .with_cc(cc.iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(decision: &str) -> Task {
        Task {
            id: 4,
            action: "password|user|3".into(),
            author_id: 3,
            approver_id: Some(1),
            user_id: Some(3),
            project_id: None,
            decision: Some(decision.into()),
            processed: true,
            done: false,
            result: None,
            comment: None,
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
            done_at: None,
        }
    }

    #[test]
    fn task_decision_reads_naturally() {
        let mail = task_decided("a@x.org", &task("accept"), "password user 3");
        assert_eq!(mail.subject, "Task #4 accept");
        assert_eq!(mail.body, "Your request to password user 3 was accepted.");

        let mail = task_decided("a@x.org", &task("reject"), "password user 3");
        assert!(mail.body.ends_with("was rejected."));
    }
}
