use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromForm;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::accounts::data::{FlashView, IdentityID};
use crate::data::text_enum;
use crate::tasks::data::{UserTask, UserTaskID};

pub type GoalID = i64;
pub type TaskID = i64;
pub type ProgressID = i64;
pub type HourLogID = i64;
pub type CategoryID = i64;

text_enum!(Priority {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
});

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// SQL expression ranking the `priority` column, most urgent first.
pub const PRIORITY_RANK: &str = "CASE priority WHEN 'HIGH' THEN 0 WHEN 'MEDIUM' THEN 1 ELSE 2 END";

text_enum!(GoalStatus {
    NotStarted => "NOT_STARTED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    OnHold => "ON_HOLD",
});

impl Default for GoalStatus {
    fn default() -> Self {
        GoalStatus::NotStarted
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: GoalID,
    pub owner_id: IdentityID,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: GoalStatus,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A to-do item scoped to one goal.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskID,
    pub goal_id: GoalID,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
    pub completed_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Progress {
    pub id: ProgressID,
    pub goal_id: GoalID,
    pub date: NaiveDate,
    pub note: String,
    pub value: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HourLog {
    pub id: HourLogID,
    pub goal_id: GoalID,
    pub date: NaiveDate,
    pub hours: Decimal,
    pub description: String,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryID,
    pub name: String,
    pub description: String,
    pub color: String,
}

#[derive(FromForm, Debug, Clone)]
pub struct GoalForm {
    #[field(default = String::new())]
    pub title: String,
    #[field(default = String::new())]
    pub description: String,
    #[field(default = GoalStatus::NotStarted)]
    pub status: GoalStatus,
    #[field(default = Priority::Medium)]
    pub priority: Priority,
    pub target_date: Option<String>,
    pub categories: Vec<CategoryID>,
}

/// A validated goal form.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalInput {
    pub title: String,
    pub description: String,
    pub status: GoalStatus,
    pub priority: Priority,
    pub target_date: Option<NaiveDate>,
    pub categories: Vec<CategoryID>,
}

#[derive(FromForm, Debug, Clone)]
pub struct TaskForm {
    #[field(default = String::new())]
    pub title: String,
    #[field(default = String::new())]
    pub description: String,
    pub is_completed: bool,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub due_date: Option<NaiveDate>,
}

#[derive(FromForm, Debug, Clone)]
pub struct AddTaskForm {
    pub task_id: Option<UserTaskID>,
}

#[derive(FromForm, Debug, Clone)]
pub struct HourLogForm {
    #[field(default = String::new())]
    pub hours: String,
    pub date: Option<String>,
    #[field(default = String::new())]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourLogInput {
    pub hours: Decimal,
    pub date: NaiveDate,
    pub description: String,
}

#[derive(FromForm, Debug, Clone)]
pub struct ProgressForm {
    pub date: Option<String>,
    #[field(default = String::new())]
    pub note: String,
    #[field(default = 0.0)]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInput {
    pub date: NaiveDate,
    pub note: String,
    pub value: f64,
}

#[derive(FromForm, Debug, Clone)]
pub struct CategoryForm {
    #[field(default = String::new())]
    pub name: String,
    #[field(default = String::new())]
    pub description: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInput {
    pub name: String,
    pub description: String,
    pub color: String,
}

/// Result of flipping a goal task, also the AJAX response body.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ToggleResult {
    pub task_id: TaskID,
    pub is_completed: bool,
    pub completion_percentage: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    #[serde(skip)]
    pub title: String,
}

/// A goal together with the figures shown next to it in lists.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GoalSummary {
    #[serde(flatten)]
    pub goal: Goal,
    pub completion_percentage: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub total_hours: Decimal,
    pub days_until_target: Option<i64>,
    pub target_date_status: String,
}

#[derive(Serialize, Debug)]
pub struct GoalListPage {
    pub goals: Vec<GoalSummary>,
    pub messages: Option<FlashView>,
}

#[derive(Serialize, Debug)]
pub struct GoalDetailPage {
    pub goal: GoalSummary,
    pub categories: Vec<Category>,
    pub tasks: Vec<Task>,
    pub hour_logs: Vec<HourLog>,
    pub progress_updates: Vec<Progress>,
    pub user_tasks: Vec<UserTask>,
    pub today: NaiveDate,
    pub messages: Option<FlashView>,
}

#[derive(Serialize, Debug)]
pub struct GoalFormPage {
    pub goal: Option<Goal>,
    pub selected_categories: Vec<CategoryID>,
    pub categories: Vec<Category>,
    pub priorities: &'static [Priority],
    pub statuses: &'static [GoalStatus],
    pub today: NaiveDate,
}

#[derive(Serialize, Debug)]
pub struct GoalTaskFormPage {
    pub goal: Goal,
    pub today: NaiveDate,
}

#[derive(Serialize, Debug)]
pub struct HourLogFormPage {
    pub goal: Goal,
    pub initial_date: NaiveDate,
}
