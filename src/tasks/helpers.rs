use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::accounts::data::{IdentityID, RequestContext};
use crate::accounts::helpers::get_identity;
use crate::forms::Validator;
use crate::goals::data::PRIORITY_RANK;
use crate::internal_error::{InternalError, InternalResult};
use crate::policy::{authorize, Action, Resource};

use super::data::*;

const USER_TASK_COLUMNS: &str = "id, owner_id, title, description, status, priority, is_completed, \
                                 due_date, completed_date, created_at, updated_at";
const TITLE_MAX_LEN: usize = 200;

fn user_task_from_row(row: &Row) -> rusqlite::Result<UserTask> {
    Ok(UserTask {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        is_completed: row.get(6)?,
        due_date: row.get(7)?,
        completed_date: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn get_user_task(
    db_connection: &Connection,
    user_task_id: UserTaskID,
) -> InternalResult<Option<UserTask>> {
    let user_task = db_connection
        .query_row(
            &format!("SELECT {} FROM user_tasks WHERE id = ?1", USER_TASK_COLUMNS),
            params![user_task_id],
            user_task_from_row,
        )
        .optional()?;

    Ok(user_task)
}

pub fn get_user_task_for(
    db_connection: &Connection,
    ctx: &RequestContext,
    user_task_id: UserTaskID,
    action: Action,
) -> InternalResult<UserTask> {
    let user_task =
        get_user_task(db_connection, user_task_id)?.ok_or(InternalError::NotFound("Task"))?;
    authorize(
        &ctx.actor,
        action,
        Resource::UserTask {
            owner: user_task.owner_id,
        },
        "Task",
    )?;
    Ok(user_task)
}

/// A user's tasks by due date (undated last), then priority, then age.
pub fn list_user_tasks(
    db_connection: &Connection,
    owner_id: IdentityID,
) -> InternalResult<Vec<UserTask>> {
    let mut statement = db_connection.prepare(&format!(
        "SELECT {} FROM user_tasks WHERE owner_id = ?1 \
         ORDER BY due_date IS NULL, due_date, {}, created_at, id",
        USER_TASK_COLUMNS, PRIORITY_RANK
    ))?;

    let user_tasks = statement
        .query_map(params![owner_id], user_task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(user_tasks)
}

impl UserTaskForm {
    /// Validates the form. Staff may hand the task to another user through
    /// the `user` field; everyone else always gets `default_owner`.
    pub fn validate(
        &self,
        db_connection: &Connection,
        ctx: &RequestContext,
        default_owner: IdentityID,
    ) -> InternalResult<UserTaskInput> {
        let mut validator = Validator::new();

        let title = validator.required_text("title", &self.title, TITLE_MAX_LEN);
        let description = validator.optional_text("description", &self.description, usize::MAX);
        let due_date = validator.optional_date("due_date", self.due_date.as_deref());
        validator.not_before("due_date", due_date, ctx.today, "Due date cannot be in the past.");

        let owner_id = match self.user {
            Some(user_id) if ctx.is_staff() => {
                if get_identity(db_connection, user_id)?.is_none() {
                    validator.error(
                        "user",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                }
                user_id
            }
            _ => default_owner,
        };

        validator.finish(UserTaskInput {
            owner_id,
            title,
            description,
            status: self.status,
            priority: self.priority,
            due_date,
        })
    }
}

/// Completion after an edit. Only a move into COMPLETED, or from COMPLETED
/// back to TODO or IN_PROGRESS, changes it. CANCELLED leaves it alone.
fn completion_after_edit(
    user_task: &UserTask,
    input: &UserTaskInput,
    today: NaiveDate,
) -> (bool, Option<NaiveDate>) {
    match (user_task.status, input.status) {
        (previous, UserTaskStatus::Completed) if previous != UserTaskStatus::Completed => {
            (true, user_task.completed_date.or(Some(today)))
        }
        (UserTaskStatus::Completed, UserTaskStatus::Todo | UserTaskStatus::InProgress) => {
            (false, None)
        }
        _ => (user_task.is_completed, user_task.completed_date),
    }
}

pub fn create_user_task(
    db_connection: &Connection,
    ctx: &RequestContext,
    input: UserTaskInput,
) -> InternalResult<UserTask> {
    if input.owner_id != ctx.actor.id && !ctx.is_staff() {
        return Err(InternalError::Forbidden(
            "Only staff can create tasks for other users.".to_string(),
        ));
    }

    db_connection.execute(
        "INSERT INTO user_tasks (owner_id, title, description, status, priority, is_completed, \
         due_date, completed_date, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            input.owner_id,
            input.title,
            input.description,
            input.status,
            input.priority,
            input.is_completed(),
            input.due_date,
            input.is_completed().then_some(ctx.today),
            ctx.now,
        ],
    )?;

    let id = db_connection.last_insert_rowid();
    get_user_task(db_connection, id)?.ok_or(InternalError::NotFound("Task"))
}

pub fn update_user_task(
    db_connection: &Connection,
    ctx: &RequestContext,
    user_task_id: UserTaskID,
    input: UserTaskInput,
) -> InternalResult<UserTask> {
    let user_task = get_user_task_for(db_connection, ctx, user_task_id, Action::Update)?;
    let (is_completed, completed_date) = completion_after_edit(&user_task, &input, ctx.today);

    db_connection.execute(
        "UPDATE user_tasks SET owner_id = ?1, title = ?2, description = ?3, status = ?4, \
         priority = ?5, is_completed = ?6, due_date = ?7, completed_date = ?8, updated_at = ?9 \
         WHERE id = ?10",
        params![
            input.owner_id,
            input.title,
            input.description,
            input.status,
            input.priority,
            is_completed,
            input.due_date,
            completed_date,
            ctx.now,
            user_task.id,
        ],
    )?;

    get_user_task(db_connection, user_task.id)?.ok_or(InternalError::NotFound("Task"))
}

pub fn delete_user_task(
    db_connection: &Connection,
    ctx: &RequestContext,
    user_task_id: UserTaskID,
) -> InternalResult<UserTask> {
    let user_task = get_user_task_for(db_connection, ctx, user_task_id, Action::Delete)?;

    db_connection.execute("DELETE FROM user_tasks WHERE id = ?1", params![user_task.id])?;
    info!(actor = ctx.actor.id, task = user_task.id, "Deleted task");

    Ok(user_task)
}

/// Flips a task between done and not done in a single statement.
pub fn toggle_user_task(
    db_connection: &Connection,
    ctx: &RequestContext,
    user_task_id: UserTaskID,
) -> InternalResult<UserTask> {
    let user_task = get_user_task_for(db_connection, ctx, user_task_id, Action::Update)?;

    db_connection.execute(
        "UPDATE user_tasks SET is_completed = NOT is_completed, \
         status = CASE WHEN is_completed THEN 'TODO' ELSE 'COMPLETED' END, \
         completed_date = CASE WHEN is_completed THEN NULL ELSE COALESCE(completed_date, ?1) END, \
         updated_at = ?2 WHERE id = ?3",
        params![ctx.today, ctx.now, user_task.id],
    )?;

    get_user_task(db_connection, user_task.id)?.ok_or(InternalError::NotFound("Task"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::helpers::tests::insert_identity;
    use crate::data::open_test_database;
    use crate::goals::data::Priority;
    use crate::goals::helpers::tests::ctx_for;

    fn input(owner_id: IdentityID, title: &str, due_date: Option<NaiveDate>) -> UserTaskInput {
        UserTaskInput {
            owner_id,
            title: title.to_string(),
            description: String::new(),
            status: UserTaskStatus::Todo,
            priority: Priority::Medium,
            due_date,
        }
    }

    fn form(title: &str, due_date: Option<&str>, user: Option<IdentityID>) -> UserTaskForm {
        UserTaskForm {
            title: title.to_string(),
            description: String::new(),
            status: UserTaskStatus::InProgress,
            priority: Priority::High,
            due_date: due_date.map(str::to_string),
            user,
        }
    }

    #[test]
    fn toggle_tracks_status_and_completed_date() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let ctx = ctx_for(&alice);
        let task = create_user_task(&db_connection, &ctx, input(alice.id, "Laundry", None)).unwrap();

        let done = toggle_user_task(&db_connection, &ctx, task.id).unwrap();
        assert!(done.is_completed);
        assert_eq!(done.status, UserTaskStatus::Completed);
        assert_eq!(done.completed_date, Some(ctx.today));

        let undone = toggle_user_task(&db_connection, &ctx, task.id).unwrap();
        assert!(!undone.is_completed);
        assert_eq!(undone.status, UserTaskStatus::Todo);
        assert_eq!(undone.completed_date, None);
        assert_eq!(undone.title, task.title);
    }

    #[test]
    fn editing_to_completed_stamps_date_once() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let ctx = ctx_for(&alice);
        let task = create_user_task(&db_connection, &ctx, input(alice.id, "Taxes", None)).unwrap();
        assert_eq!(task.completed_date, None);

        let mut completed = input(alice.id, "Taxes", None);
        completed.status = UserTaskStatus::Completed;
        let task = update_user_task(&db_connection, &ctx, task.id, completed.clone()).unwrap();
        assert!(task.is_completed);
        assert_eq!(task.completed_date, Some(ctx.today));

        let mut later = ctx.clone();
        later.today = ctx.today.succ_opt().unwrap();
        let task = update_user_task(&db_connection, &later, task.id, completed).unwrap();
        assert_eq!(task.completed_date, Some(ctx.today));

        let mut reopened = input(alice.id, "Taxes", None);
        reopened.status = UserTaskStatus::InProgress;
        let task = update_user_task(&db_connection, &ctx, task.id, reopened).unwrap();
        assert!(!task.is_completed);
        assert_eq!(task.completed_date, None);
    }

    #[test]
    fn cancelling_a_done_task_keeps_it_done() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let ctx = ctx_for(&alice);
        let task = create_user_task(&db_connection, &ctx, input(alice.id, "Taxes", None)).unwrap();
        toggle_user_task(&db_connection, &ctx, task.id).unwrap();

        let mut cancelled = input(alice.id, "Taxes", None);
        cancelled.status = UserTaskStatus::Cancelled;
        let task = update_user_task(&db_connection, &ctx, task.id, cancelled.clone()).unwrap();
        assert_eq!(task.status, UserTaskStatus::Cancelled);
        assert!(task.is_completed);
        assert_eq!(task.completed_date, Some(ctx.today));

        let stats = crate::stats::helpers::user_stats(&db_connection, &alice, alice.id).unwrap();
        assert_eq!(stats.completed_tasks_count, 1);

        let open = create_user_task(&db_connection, &ctx, input(alice.id, "Dishes", None)).unwrap();
        let open = update_user_task(&db_connection, &ctx, open.id, cancelled).unwrap();
        assert!(!open.is_completed);
        assert_eq!(open.completed_date, None);
    }

    #[test]
    fn only_staff_delete_tasks() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let admin = insert_identity(&db_connection, "admin", true);
        let task = create_user_task(&db_connection, &ctx_for(&alice), input(alice.id, "Keep", None))
            .unwrap();

        assert!(matches!(
            delete_user_task(&db_connection, &ctx_for(&alice), task.id),
            Err(InternalError::Forbidden(_))
        ));
        delete_user_task(&db_connection, &ctx_for(&admin), task.id).unwrap();
        assert!(get_user_task(&db_connection, task.id).unwrap().is_none());
    }

    #[test]
    fn strangers_see_nothing() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let bob = insert_identity(&db_connection, "bob", false);
        let task = create_user_task(&db_connection, &ctx_for(&alice), input(alice.id, "Mine", None))
            .unwrap();

        assert!(matches!(
            toggle_user_task(&db_connection, &ctx_for(&bob), task.id),
            Err(InternalError::NotFound("Task"))
        ));
        assert!(list_user_tasks(&db_connection, bob.id).unwrap().is_empty());
    }

    #[test]
    fn owner_selector_is_staff_only() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let bob = insert_identity(&db_connection, "bob", false);
        let admin = insert_identity(&db_connection, "admin", true);

        let sneaky = form("Chore", None, Some(bob.id))
            .validate(&db_connection, &ctx_for(&alice), alice.id)
            .unwrap();
        assert_eq!(sneaky.owner_id, alice.id);

        let assigned = form("Chore", None, Some(bob.id))
            .validate(&db_connection, &ctx_for(&admin), admin.id)
            .unwrap();
        assert_eq!(assigned.owner_id, bob.id);
        let task = create_user_task(&db_connection, &ctx_for(&admin), assigned).unwrap();
        assert_eq!(task.owner_id, bob.id);

        assert!(form("Chore", None, Some(999))
            .validate(&db_connection, &ctx_for(&admin), admin.id)
            .is_err());
    }

    #[test]
    fn form_rejects_past_due_date() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);

        match form("Late", Some("2000-01-01"), None).validate(&db_connection, &ctx_for(&alice), alice.id) {
            Err(InternalError::Validation(fields)) => {
                assert_eq!(fields[0].message, "Due date cannot be in the past.")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn tasks_order_by_due_date_then_priority() {
        let db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let ctx = ctx_for(&alice);
        let today = ctx.today;

        let mut low = input(alice.id, "low today", Some(today));
        low.priority = Priority::Low;
        let mut high = input(alice.id, "high today", Some(today));
        high.priority = Priority::High;

        create_user_task(&db_connection, &ctx, input(alice.id, "undated", None)).unwrap();
        create_user_task(&db_connection, &ctx, input(alice.id, "tomorrow", today.succ_opt())).unwrap();
        create_user_task(&db_connection, &ctx, low).unwrap();
        create_user_task(&db_connection, &ctx, high).unwrap();

        let titles: Vec<String> = list_user_tasks(&db_connection, alice.id)
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["high today", "low today", "tomorrow", "undated"]);
    }
}
