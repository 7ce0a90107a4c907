//! User and staged profile-edit models.

use hpcalloc_core::profile::UserProfile;
use hpcalloc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub login: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub lab: Option<String>,
    pub position: Option<String>,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// The editable part of the row.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            lab: self.lab.clone(),
            position: self.position.clone(),
        }
    }
}

/// DTO for creating a user. New users start inactive.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub login: Option<String>,
    pub profile: UserProfile,
    pub active: bool,
}

/// A row from the `user_edits` staging table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserEdit {
    pub id: DbId,
    pub user_id: DbId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub lab: Option<String>,
    pub position: Option<String>,
    pub created_at: Timestamp,
}

impl UserEdit {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            lab: self.lab.clone(),
            position: self.position.clone(),
        }
    }
}
