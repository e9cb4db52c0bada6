use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::info;

use crate::accounts::data::{IdentityID, RequestContext};
use crate::forms::Validator;
use crate::internal_error::{InternalError, InternalResult};
use crate::policy::{authorize, Action, Resource};
use crate::stats::helpers::{goal_task_counts, summarize_goal};
use crate::tasks::data::UserTaskID;
use crate::tasks::helpers::{get_user_task_for, list_user_tasks};

use super::data::*;

const GOAL_COLUMNS: &str = "id, owner_id, title, description, priority, status, start_date, \
                            target_date, completed_date, created_at, updated_at";
const TASK_COLUMNS: &str =
    "id, goal_id, title, description, is_completed, due_date, completed_date, created_at, updated_at";

const TITLE_MAX_LEN: usize = 200;
const CATEGORY_NAME_MAX_LEN: usize = 100;
const HOURS_MAX_DIGITS: u32 = 5;
const HOURS_DECIMAL_PLACES: u32 = 2;

fn goal_from_row(row: &Row) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        status: row.get(5)?,
        start_date: row.get(6)?,
        target_date: row.get(7)?,
        completed_date: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        goal_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        is_completed: row.get(4)?,
        due_date: row.get(5)?,
        completed_date: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Hour amounts are stored as whole hundredths so sums stay exact.
pub fn hours_to_centi(hours: Decimal) -> i64 {
    let mut hours = hours;
    hours.rescale(HOURS_DECIMAL_PLACES);
    hours.mantissa() as i64
}

pub fn centi_to_hours(centi: i64) -> Decimal {
    Decimal::new(centi, HOURS_DECIMAL_PLACES)
}

/// Completion date a goal should carry after its status changed.
fn goal_completed_date(
    status: GoalStatus,
    previous: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    match status {
        GoalStatus::Completed => previous.or(Some(today)),
        _ => None,
    }
}

pub fn get_goal(db_connection: &Connection, goal_id: GoalID) -> InternalResult<Option<Goal>> {
    let goal = db_connection
        .query_row(
            &format!("SELECT {} FROM goals WHERE id = ?1", GOAL_COLUMNS),
            params![goal_id],
            goal_from_row,
        )
        .optional()?;

    Ok(goal)
}

/// Loads a goal and checks the actor may perform `action` on it.
pub fn get_goal_for(
    db_connection: &Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    action: Action,
) -> InternalResult<Goal> {
    let goal = get_goal(db_connection, goal_id)?.ok_or(InternalError::NotFound("Goal"))?;
    authorize(
        &ctx.actor,
        action,
        Resource::Goal {
            owner: goal.owner_id,
        },
        "Goal",
    )?;
    Ok(goal)
}

pub fn list_goals(db_connection: &Connection, owner_id: IdentityID) -> InternalResult<Vec<Goal>> {
    let mut statement = db_connection.prepare(&format!(
        "SELECT {} FROM goals WHERE owner_id = ?1 ORDER BY {}, created_at, id",
        GOAL_COLUMNS, PRIORITY_RANK
    ))?;

    let goals = statement
        .query_map(params![owner_id], goal_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(goals)
}

/// Goals not yet completed, most urgent first, then by nearest target date.
pub fn current_goals(db_connection: &Connection, owner_id: IdentityID) -> InternalResult<Vec<Goal>> {
    let mut statement = db_connection.prepare(&format!(
        "SELECT {} FROM goals WHERE owner_id = ?1 AND status != 'COMPLETED' \
         ORDER BY {}, target_date IS NULL, target_date, id",
        GOAL_COLUMNS, PRIORITY_RANK
    ))?;

    let goals = statement
        .query_map(params![owner_id], goal_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(goals)
}

fn category_exists(db_connection: &Connection, category_id: CategoryID) -> InternalResult<bool> {
    let found = db_connection
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1",
            params![category_id],
            |_| Ok(()),
        )
        .optional()?;

    Ok(found.is_some())
}

impl GoalForm {
    pub fn validate(&self, db_connection: &Connection, today: NaiveDate) -> InternalResult<GoalInput> {
        let mut validator = Validator::new();

        let title = validator.required_text("title", &self.title, TITLE_MAX_LEN);
        let description = validator.optional_text("description", &self.description, usize::MAX);
        let target_date = validator.optional_date("target_date", self.target_date.as_deref());
        validator.not_before(
            "target_date",
            target_date,
            today,
            "Target date cannot be in the past.",
        );

        let mut categories = Vec::new();
        for &category_id in &self.categories {
            if !category_exists(db_connection, category_id)? {
                validator.error(
                    "categories",
                    format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        category_id
                    ),
                );
            } else if !categories.contains(&category_id) {
                categories.push(category_id);
            }
        }

        validator.finish(GoalInput {
            title,
            description,
            status: self.status,
            priority: self.priority,
            target_date,
            categories,
        })
    }
}

pub fn set_goal_categories(
    db_connection: &Connection,
    goal_id: GoalID,
    categories: &[CategoryID],
) -> InternalResult<()> {
    db_connection.execute(
        "DELETE FROM goal_categories WHERE goal_id = ?1",
        params![goal_id],
    )?;

    for category_id in categories {
        db_connection.execute(
            "INSERT INTO goal_categories (goal_id, category_id) VALUES (?1, ?2)",
            params![goal_id, category_id],
        )?;
    }

    Ok(())
}

pub fn goal_categories(db_connection: &Connection, goal_id: GoalID) -> InternalResult<Vec<Category>> {
    let mut statement = db_connection.prepare(
        "SELECT c.id, c.name, c.description, c.color FROM categories c \
         JOIN goal_categories gc ON gc.category_id = c.id \
         WHERE gc.goal_id = ?1 ORDER BY c.name",
    )?;

    let categories = statement
        .query_map(params![goal_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                color: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(categories)
}

pub fn create_goal(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    input: GoalInput,
) -> InternalResult<Goal> {
    let tx = db_connection.transaction()?;
    tx.execute(
        "INSERT INTO goals (owner_id, title, description, priority, status, start_date, \
         target_date, completed_date, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            ctx.actor.id,
            input.title,
            input.description,
            input.priority,
            input.status,
            ctx.today,
            input.target_date,
            goal_completed_date(input.status, None, ctx.today),
            ctx.now,
        ],
    )?;
    let goal_id = tx.last_insert_rowid();
    set_goal_categories(&tx, goal_id, &input.categories)?;
    tx.commit()?;

    get_goal(db_connection, goal_id)?.ok_or(InternalError::NotFound("Goal"))
}

pub fn update_goal(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    input: GoalInput,
) -> InternalResult<Goal> {
    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Update)?;

    let tx = db_connection.transaction()?;
    tx.execute(
        "UPDATE goals SET title = ?1, description = ?2, priority = ?3, status = ?4, \
         target_date = ?5, completed_date = ?6, updated_at = ?7 WHERE id = ?8",
        params![
            input.title,
            input.description,
            input.priority,
            input.status,
            input.target_date,
            goal_completed_date(input.status, goal.completed_date, ctx.today),
            ctx.now,
            goal.id,
        ],
    )?;
    set_goal_categories(&tx, goal.id, &input.categories)?;
    tx.commit()?;

    get_goal(db_connection, goal.id)?.ok_or(InternalError::NotFound("Goal"))
}

/// Removes a goal and every row hanging off it. Callers own the transaction.
pub fn delete_goal_rows(db_connection: &Connection, goal_id: GoalID) -> InternalResult<()> {
    db_connection.execute("DELETE FROM goal_categories WHERE goal_id = ?1", params![goal_id])?;
    db_connection.execute("DELETE FROM goal_tasks WHERE goal_id = ?1", params![goal_id])?;
    db_connection.execute("DELETE FROM progress_updates WHERE goal_id = ?1", params![goal_id])?;
    db_connection.execute("DELETE FROM hour_logs WHERE goal_id = ?1", params![goal_id])?;
    db_connection.execute("DELETE FROM goals WHERE id = ?1", params![goal_id])?;

    Ok(())
}

pub fn delete_goal(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
) -> InternalResult<Goal> {
    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Delete)?;

    let tx = db_connection.transaction()?;
    delete_goal_rows(&tx, goal.id)?;
    tx.commit()?;

    info!(actor = ctx.actor.id, goal = goal.id, "Deleted goal");

    Ok(goal)
}

pub fn list_categories(db_connection: &Connection) -> InternalResult<Vec<Category>> {
    let mut statement =
        db_connection.prepare("SELECT id, name, description, color FROM categories ORDER BY name")?;

    let categories = statement
        .query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                color: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(categories)
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl CategoryForm {
    pub fn validate(&self) -> InternalResult<CategoryInput> {
        let mut validator = Validator::new();

        let name = validator.required_text("name", &self.name, CATEGORY_NAME_MAX_LEN);
        let description = validator.optional_text("description", &self.description, usize::MAX);
        let color = match self.color.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(color) if is_hex_color(color) => color.to_lowercase(),
            Some(_) => {
                validator.error("color", "Enter a hex color such as #007bff.");
                String::new()
            }
            None => "#007bff".to_string(),
        };

        validator.finish(CategoryInput {
            name,
            description,
            color,
        })
    }
}

pub fn create_category(
    db_connection: &Connection,
    ctx: &RequestContext,
    input: CategoryInput,
) -> InternalResult<Category> {
    if !ctx.is_staff() {
        return Err(InternalError::Forbidden(
            "Only staff can create categories.".to_string(),
        ));
    }

    db_connection.execute(
        "INSERT INTO categories (name, description, color) VALUES (?1, ?2, ?3)",
        params![input.name, input.description, input.color],
    )?;

    Ok(Category {
        id: db_connection.last_insert_rowid(),
        name: input.name,
        description: input.description,
        color: input.color,
    })
}

/// Tasks of a goal by due date (undated last), then creation order.
pub fn list_goal_tasks(db_connection: &Connection, goal_id: GoalID) -> InternalResult<Vec<Task>> {
    let mut statement = db_connection.prepare(&format!(
        "SELECT {} FROM goal_tasks WHERE goal_id = ?1 \
         ORDER BY due_date IS NULL, due_date, created_at, id",
        TASK_COLUMNS
    ))?;

    let tasks = statement
        .query_map(params![goal_id], task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tasks)
}

pub fn get_goal_task(
    db_connection: &Connection,
    goal_id: GoalID,
    task_id: TaskID,
) -> InternalResult<Option<Task>> {
    let task = db_connection
        .query_row(
            &format!(
                "SELECT {} FROM goal_tasks WHERE id = ?1 AND goal_id = ?2",
                TASK_COLUMNS
            ),
            params![task_id, goal_id],
            task_from_row,
        )
        .optional()?;

    Ok(task)
}

impl TaskForm {
    pub fn validate(&self, today: NaiveDate) -> InternalResult<TaskInput> {
        let mut validator = Validator::new();

        let title = validator.required_text("title", &self.title, TITLE_MAX_LEN);
        let description = validator.optional_text("description", &self.description, usize::MAX);
        let due_date = validator.optional_date("due_date", self.due_date.as_deref());
        validator.not_before("due_date", due_date, today, "Due date cannot be in the past.");

        validator.finish(TaskInput {
            title,
            description,
            is_completed: self.is_completed,
            due_date,
        })
    }
}

fn insert_goal_task(
    db_connection: &Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    input: &TaskInput,
    completed_date: Option<NaiveDate>,
) -> InternalResult<Task> {
    db_connection.execute(
        "INSERT INTO goal_tasks (goal_id, title, description, is_completed, due_date, \
         completed_date, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            goal_id,
            input.title,
            input.description,
            input.is_completed,
            input.due_date,
            completed_date,
            ctx.now,
        ],
    )?;

    let task_id = db_connection.last_insert_rowid();
    get_goal_task(db_connection, goal_id, task_id)?.ok_or(InternalError::NotFound("Task"))
}

pub fn create_task_for_goal(
    db_connection: &Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    input: TaskInput,
) -> InternalResult<(Goal, Task)> {
    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Update)?;
    let completed_date = input.is_completed.then_some(ctx.today);
    let task = insert_goal_task(db_connection, ctx, goal.id, &input, completed_date)?;
    Ok((goal, task))
}

/// Copies one of the actor's own tasks onto the goal. The copy is an
/// independent record; later edits to either side do not propagate. A done
/// task keeps the day it was actually completed.
pub fn add_task_to_goal(
    db_connection: &Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    user_task_id: UserTaskID,
) -> InternalResult<(Goal, Task)> {
    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Update)?;
    let user_task = get_user_task_for(db_connection, ctx, user_task_id, Action::Read)?;
    if user_task.owner_id != ctx.actor.id {
        return Err(InternalError::NotFound("Task"));
    }

    let input = TaskInput {
        title: user_task.title,
        description: user_task.description,
        is_completed: user_task.is_completed,
        due_date: user_task.due_date,
    };
    let task = insert_goal_task(db_connection, ctx, goal.id, &input, user_task.completed_date)?;

    Ok((goal, task))
}

/// Flips a goal task between done and not done and reports the goal's new
/// completion figures.
pub fn toggle_goal_task(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    task_id: TaskID,
) -> InternalResult<ToggleResult> {
    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Update)?;

    let tx = db_connection.transaction()?;
    let changed = tx.execute(
        "UPDATE goal_tasks SET is_completed = NOT is_completed, \
         completed_date = CASE WHEN is_completed THEN NULL ELSE COALESCE(completed_date, ?1) END, \
         updated_at = ?2 WHERE id = ?3 AND goal_id = ?4",
        params![ctx.today, ctx.now, task_id, goal.id],
    )?;
    if changed == 0 {
        return Err(InternalError::NotFound("Task"));
    }

    let task = get_goal_task(&tx, goal.id, task_id)?.ok_or(InternalError::NotFound("Task"))?;
    let counts = goal_task_counts(&tx, goal.id)?;
    tx.commit()?;

    Ok(ToggleResult {
        task_id: task.id,
        is_completed: task.is_completed,
        completion_percentage: counts.completion_percentage(),
        total_tasks: counts.total,
        completed_tasks: counts.completed,
        title: task.title,
    })
}

impl HourLogForm {
    pub fn validate(&self, today: NaiveDate) -> InternalResult<HourLogInput> {
        let mut validator = Validator::new();

        let hours = validator.decimal("hours", &self.hours, HOURS_MAX_DIGITS, HOURS_DECIMAL_PLACES);
        if matches!(hours, Some(hours) if hours <= Decimal::ZERO) {
            validator.error("hours", "Hours must be greater than zero.");
        }

        let date = validator
            .optional_date("date", self.date.as_deref())
            .unwrap_or(today);
        validator.not_after("date", Some(date), today, "Date cannot be in the future.");

        let description = validator.optional_text("description", &self.description, usize::MAX);

        validator.finish(HourLogInput {
            hours: hours.unwrap_or(Decimal::ZERO),
            date,
            description,
        })
    }
}

pub fn log_hours(
    db_connection: &Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    input: HourLogInput,
) -> InternalResult<(Goal, HourLog)> {
    if input.hours <= Decimal::ZERO {
        return Err(InternalError::invalid("hours", "Hours must be greater than zero."));
    }
    if input.hours.normalize().scale() > HOURS_DECIMAL_PLACES {
        return Err(InternalError::invalid(
            "hours",
            format!(
                "Ensure that there are no more than {} decimal places.",
                HOURS_DECIMAL_PLACES
            ),
        ));
    }
    if input.date > ctx.today {
        return Err(InternalError::invalid("date", "Date cannot be in the future."));
    }

    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Update)?;

    db_connection.execute(
        "INSERT INTO hour_logs (goal_id, date, hours_centi, description, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            goal.id,
            input.date,
            hours_to_centi(input.hours),
            input.description,
            ctx.now,
        ],
    )?;

    let hour_log = HourLog {
        id: db_connection.last_insert_rowid(),
        goal_id: goal.id,
        date: input.date,
        hours: centi_to_hours(hours_to_centi(input.hours)),
        description: input.description,
        created_at: ctx.now,
    };

    Ok((goal, hour_log))
}

/// Hour logs of a goal, newest first.
pub fn goal_hour_logs(db_connection: &Connection, goal_id: GoalID) -> InternalResult<Vec<HourLog>> {
    let mut statement = db_connection.prepare(
        "SELECT id, goal_id, date, hours_centi, description, created_at FROM hour_logs \
         WHERE goal_id = ?1 ORDER BY date DESC, created_at DESC, id DESC",
    )?;

    let hour_logs = statement
        .query_map(params![goal_id], |row| {
            Ok(HourLog {
                id: row.get(0)?,
                goal_id: row.get(1)?,
                date: row.get(2)?,
                hours: centi_to_hours(row.get(3)?),
                description: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(hour_logs)
}

impl ProgressForm {
    pub fn validate(&self, today: NaiveDate) -> InternalResult<ProgressInput> {
        let mut validator = Validator::new();

        let date = validator
            .optional_date("date", self.date.as_deref())
            .unwrap_or(today);
        let note = validator.required_text("note", &self.note, usize::MAX);
        if !self.value.is_finite() {
            validator.error("value", "Enter a number.");
        }

        validator.finish(ProgressInput {
            date,
            note,
            value: self.value,
        })
    }
}

pub fn add_progress(
    db_connection: &Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
    input: ProgressInput,
) -> InternalResult<(Goal, Progress)> {
    let goal = get_goal_for(db_connection, ctx, goal_id, Action::Update)?;

    db_connection.execute(
        "INSERT INTO progress_updates (goal_id, date, note, value) VALUES (?1, ?2, ?3, ?4)",
        params![goal.id, input.date, input.note, input.value],
    )?;

    let progress = Progress {
        id: db_connection.last_insert_rowid(),
        goal_id: goal.id,
        date: input.date,
        note: input.note,
        value: input.value,
    };

    Ok((goal, progress))
}

/// Progress updates of a goal, newest first.
pub fn goal_progress(db_connection: &Connection, goal_id: GoalID) -> InternalResult<Vec<Progress>> {
    let mut statement = db_connection.prepare(
        "SELECT id, goal_id, date, note, value FROM progress_updates \
         WHERE goal_id = ?1 ORDER BY date DESC, id DESC",
    )?;

    let progress = statement
        .query_map(params![goal_id], |row| {
            Ok(Progress {
                id: row.get(0)?,
                goal_id: row.get(1)?,
                date: row.get(2)?,
                note: row.get(3)?,
                value: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(progress)
}

pub fn goal_detail(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    goal_id: GoalID,
) -> InternalResult<GoalDetailPage> {
    let tx = db_connection.transaction()?;

    let goal = get_goal_for(&tx, ctx, goal_id, Action::Read)?;
    let page = GoalDetailPage {
        categories: goal_categories(&tx, goal.id)?,
        tasks: list_goal_tasks(&tx, goal.id)?,
        hour_logs: goal_hour_logs(&tx, goal.id)?,
        progress_updates: goal_progress(&tx, goal.id)?,
        user_tasks: list_user_tasks(&tx, ctx.actor.id)?
            .into_iter()
            .filter(|user_task| !user_task.is_completed)
            .collect(),
        today: ctx.today,
        messages: None,
        goal: summarize_goal(&tx, goal, ctx.today)?,
    };
    tx.commit()?;

    Ok(page)
}
