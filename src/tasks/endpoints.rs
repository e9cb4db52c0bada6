use rocket::form::Form;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::serde::json::Json;
use rocket::{get, post, State};

use crate::accounts::data::{FlashView, RequestContext};
use crate::accounts::helpers::list_identities;
use crate::data::DBConnection;
use crate::goals::data::Priority;
use crate::internal_error::InternalResult;
use crate::policy::Action;

use super::data::*;
use super::helpers::*;

fn form_page(
    db_connection: &rusqlite::Connection,
    ctx: &RequestContext,
    task: Option<UserTask>,
) -> InternalResult<UserTaskFormPage> {
    let users = if ctx.is_staff() {
        Some(list_identities(db_connection)?)
    } else {
        None
    };

    Ok(UserTaskFormPage {
        task,
        statuses: UserTaskStatus::ALL,
        priorities: Priority::ALL,
        users,
        today: ctx.today,
    })
}

#[get("/tasks")]
pub fn task_list(
    ctx: RequestContext,
    flash: Option<FlashMessage<'_>>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<UserTaskListPage>> {
    let db_connection = db_connection.lock()?;

    Ok(Json(UserTaskListPage {
        tasks: list_user_tasks(&db_connection, ctx.actor.id)?,
        messages: FlashView::from_flash(flash),
    }))
}

#[get("/tasks/create")]
pub fn create_task_page(
    ctx: RequestContext,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<UserTaskFormPage>> {
    let db_connection = db_connection.lock()?;
    form_page(&db_connection, &ctx, None).map(Json)
}

#[post("/tasks/create", data = "<form>")]
pub fn create_task(
    ctx: RequestContext,
    form: Form<UserTaskForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    let input = form.validate(&db_connection, &ctx, ctx.actor.id)?;
    create_user_task(&db_connection, &ctx, input)?;

    Ok(Flash::success(
        Redirect::to("/tasks/"),
        "Task created successfully!",
    ))
}

#[get("/tasks/<task_id>/update")]
pub fn update_task_page(
    ctx: RequestContext,
    task_id: UserTaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<UserTaskFormPage>> {
    let db_connection = db_connection.lock()?;

    let task = get_user_task_for(&db_connection, &ctx, task_id, Action::Update)?;
    form_page(&db_connection, &ctx, Some(task)).map(Json)
}

#[post("/tasks/<task_id>/update", data = "<form>")]
pub fn update_task(
    ctx: RequestContext,
    task_id: UserTaskID,
    form: Form<UserTaskForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    let task = get_user_task_for(&db_connection, &ctx, task_id, Action::Update)?;
    let input = form.validate(&db_connection, &ctx, task.owner_id)?;
    update_user_task(&db_connection, &ctx, task.id, input)?;

    Ok(Flash::success(
        Redirect::to("/tasks/"),
        "Task updated successfully!",
    ))
}

#[post("/tasks/<task_id>/delete")]
pub fn delete_task(
    ctx: RequestContext,
    task_id: UserTaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    delete_user_task(&db_connection, &ctx, task_id)?;

    Ok(Flash::success(
        Redirect::to("/tasks/"),
        "Task deleted successfully!",
    ))
}

#[post("/tasks/<task_id>/toggle")]
pub fn toggle_task(
    ctx: RequestContext,
    task_id: UserTaskID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    let task = toggle_user_task(&db_connection, &ctx, task_id)?;
    let state = if task.is_completed {
        "completed"
    } else {
        "incomplete"
    };

    Ok(Flash::success(
        Redirect::to("/tasks/"),
        format!("Task \"{}\" marked as {}.", task.title, state),
    ))
}
