use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromForm;
use serde::Serialize;

use crate::accounts::data::{FlashView, Identity, IdentityID};
use crate::data::text_enum;
use crate::goals::data::Priority;

pub type UserTaskID = i64;

text_enum!(UserTaskStatus {
    Todo => "TODO",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl Default for UserTaskStatus {
    fn default() -> Self {
        UserTaskStatus::Todo
    }
}

/// A standalone to-do item owned directly by a user.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserTask {
    pub id: UserTaskID,
    pub owner_id: IdentityID,
    pub title: String,
    pub description: String,
    pub status: UserTaskStatus,
    pub priority: Priority,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(FromForm, Debug, Clone)]
pub struct UserTaskForm {
    #[field(default = String::new())]
    pub title: String,
    #[field(default = String::new())]
    pub description: String,
    #[field(default = UserTaskStatus::Todo)]
    pub status: UserTaskStatus,
    #[field(default = Priority::Medium)]
    pub priority: Priority,
    pub due_date: Option<String>,
    /// Owner selector, only honoured for staff.
    pub user: Option<IdentityID>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserTaskInput {
    pub owner_id: IdentityID,
    pub title: String,
    pub description: String,
    pub status: UserTaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

impl UserTaskInput {
    pub fn is_completed(&self) -> bool {
        self.status == UserTaskStatus::Completed
    }
}

#[derive(Serialize, Debug)]
pub struct UserTaskListPage {
    pub tasks: Vec<UserTask>,
    pub messages: Option<FlashView>,
}

#[derive(Serialize, Debug)]
pub struct UserTaskFormPage {
    pub task: Option<UserTask>,
    pub statuses: &'static [UserTaskStatus],
    pub priorities: &'static [Priority],
    /// Candidate owners, present for staff only.
    pub users: Option<Vec<Identity>>,
    pub today: NaiveDate,
}
