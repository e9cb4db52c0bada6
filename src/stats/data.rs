use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use std::cmp::Ordering;

use crate::accounts::data::{FlashView, Identity, IdentityID, Profile};
use crate::goals::data::GoalSummary;

/// Completed and total task counts of one goal.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskCounts {
    pub total: u32,
    pub completed: u32,
}

impl TaskCounts {
    pub fn completion_percentage(&self) -> u32 {
        completion_percentage(self.completed, self.total)
    }
}

/// `round(100 * completed / total)` with halves rounded up, `0` when there
/// is nothing to complete.
pub fn completion_percentage(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }

    let (completed, total) = (u64::from(completed), u64::from(total));
    ((200 * completed + total) / (2 * total)) as u32
}

/// One row of the community leaderboard.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user_id: IdentityID,
    pub username: String,
    pub completed_goals_count: u32,
    pub total_goals_count: u32,
    pub goals_completion_percentage: u32,
    pub completed_tasks_count: u32,
    pub tasks_in_progress_count: u32,
    pub total_hours: Decimal,
    pub is_current_user: bool,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CompletedGoalsCount,
    TotalGoalsCount,
    TotalHours,
    CompletedTasksCount,
    /// Used for the "top users" box on profile pages, not selectable from
    /// the community page.
    GoalsCompletionPercentage,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::CompletedTasksCount
    }
}

impl SortKey {
    /// Reads the `sort_by` query value, falling back to completed tasks for
    /// anything unrecognised.
    pub fn from_query(sort_by: Option<&str>) -> SortKey {
        match sort_by {
            Some("completed_goals_count") => SortKey::CompletedGoalsCount,
            Some("total_goals_count") => SortKey::TotalGoalsCount,
            Some("total_hours") => SortKey::TotalHours,
            _ => SortKey::CompletedTasksCount,
        }
    }

    /// Orders the larger value first.
    pub fn compare_descending(&self, a: &UserStats, b: &UserStats) -> Ordering {
        match self {
            SortKey::CompletedGoalsCount => b.completed_goals_count.cmp(&a.completed_goals_count),
            SortKey::TotalGoalsCount => b.total_goals_count.cmp(&a.total_goals_count),
            SortKey::TotalHours => b.total_hours.cmp(&a.total_hours),
            SortKey::CompletedTasksCount => b.completed_tasks_count.cmp(&a.completed_tasks_count),
            SortKey::GoalsCompletionPercentage => b
                .goals_completion_percentage
                .cmp(&a.goals_completion_percentage),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: u32,
}

#[derive(Serialize, Debug)]
pub struct DashboardPage {
    pub completed_tasks_count: u32,
    pub total_goals_count: u32,
    pub completed_goals_count: u32,
    pub goals_completion_percentage: u32,
    pub current_goals: Vec<GoalSummary>,
    pub top_users: Vec<UserStats>,
    pub is_admin: bool,
    pub messages: Option<FlashView>,
}

#[derive(Serialize, Debug)]
pub struct CommunityPage {
    pub user_stats: Vec<UserStats>,
    pub sort_by: SortKey,
    pub is_admin: bool,
    pub messages: Option<FlashView>,
}

#[derive(Serialize, Debug)]
pub struct UserDetailPage {
    pub profile_user: Identity,
    pub profile: Option<Profile>,
    pub stats: UserStats,
    pub current_goals: Vec<GoalSummary>,
    pub top_users: Vec<UserStats>,
    pub is_admin: bool,
    pub messages: Option<FlashView>,
}
