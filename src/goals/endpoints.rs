use rocket::form::Form;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::serde::json::Json;
use rocket::{get, post, Responder, State};

use crate::accounts::data::{AjaxRequest, FlashView, RequestContext};
use crate::data::DBConnection;
use crate::internal_error::InternalResult;
use crate::policy::Action;
use crate::stats::helpers::summarize_goals;

use super::data::*;
use super::helpers::*;

fn goal_url(goal_id: GoalID) -> String {
    format!("/goals/{}/", goal_id)
}

#[get("/goals")]
pub fn goal_list(
    ctx: RequestContext,
    flash: Option<FlashMessage<'_>>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<GoalListPage>> {
    let db_connection = db_connection.lock()?;

    let goals = list_goals(&db_connection, ctx.actor.id)?;

    Ok(Json(GoalListPage {
        goals: summarize_goals(&db_connection, goals, ctx.today)?,
        messages: FlashView::from_flash(flash),
    }))
}

#[get("/goals/create")]
pub fn create_goal_page(
    ctx: RequestContext,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<GoalFormPage>> {
    let db_connection = db_connection.lock()?;

    Ok(Json(GoalFormPage {
        goal: None,
        selected_categories: vec![],
        categories: list_categories(&db_connection)?,
        priorities: Priority::ALL,
        statuses: GoalStatus::ALL,
        today: ctx.today,
    }))
}

#[post("/goals/create", data = "<form>")]
pub fn create_goal_submit(
    ctx: RequestContext,
    form: Form<GoalForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let mut db_connection = db_connection.lock()?;

    let input = form.validate(&db_connection, ctx.today)?;
    create_goal(&mut db_connection, &ctx, input)?;

    Ok(Flash::success(
        Redirect::to("/goals/"),
        "Goal created successfully!",
    ))
}

#[get("/goals/<goal_id>")]
pub fn goal_page(
    ctx: RequestContext,
    goal_id: GoalID,
    flash: Option<FlashMessage<'_>>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<GoalDetailPage>> {
    let mut db_connection = db_connection.lock()?;

    let mut page = goal_detail(&mut db_connection, &ctx, goal_id)?;
    page.messages = FlashView::from_flash(flash);

    Ok(Json(page))
}

#[get("/goals/<goal_id>/update")]
pub fn update_goal_page(
    ctx: RequestContext,
    goal_id: GoalID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<GoalFormPage>> {
    let db_connection = db_connection.lock()?;

    let goal = get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;
    let selected_categories = goal_categories(&db_connection, goal.id)?
        .into_iter()
        .map(|category| category.id)
        .collect();

    Ok(Json(GoalFormPage {
        goal: Some(goal),
        selected_categories,
        categories: list_categories(&db_connection)?,
        priorities: Priority::ALL,
        statuses: GoalStatus::ALL,
        today: ctx.today,
    }))
}

#[post("/goals/<goal_id>/update", data = "<form>")]
pub fn update_goal_submit(
    ctx: RequestContext,
    goal_id: GoalID,
    form: Form<GoalForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let mut db_connection = db_connection.lock()?;

    get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;
    let input = form.validate(&db_connection, ctx.today)?;
    update_goal(&mut db_connection, &ctx, goal_id, input)?;

    Ok(Flash::success(
        Redirect::to("/goals/"),
        "Goal updated successfully!",
    ))
}

#[post("/goals/<goal_id>/delete")]
pub fn delete_goal_submit(
    ctx: RequestContext,
    goal_id: GoalID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let mut db_connection = db_connection.lock()?;

    delete_goal(&mut db_connection, &ctx, goal_id)?;

    Ok(Flash::success(
        Redirect::to("/goals/"),
        "Goal deleted successfully!",
    ))
}

#[post("/goals/<goal_id>/add-task", data = "<form>")]
pub fn add_task(
    ctx: RequestContext,
    goal_id: GoalID,
    form: Form<AddTaskForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    let task_id = match form.task_id {
        Some(task_id) => task_id,
        None => {
            get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;
            return Ok(Flash::warning(
                Redirect::to(goal_url(goal_id)),
                "Select a task to add.",
            ));
        }
    };

    let (goal, task) = add_task_to_goal(&db_connection, &ctx, goal_id, task_id)?;

    Ok(Flash::success(
        Redirect::to(goal_url(goal.id)),
        format!("Task \"{}\" added to goal \"{}\".", task.title, goal.title),
    ))
}

#[get("/goals/<goal_id>/create-task")]
pub fn create_goal_task_page(
    ctx: RequestContext,
    goal_id: GoalID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<GoalTaskFormPage>> {
    let db_connection = db_connection.lock()?;

    let goal = get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;

    Ok(Json(GoalTaskFormPage {
        goal,
        today: ctx.today,
    }))
}

#[post("/goals/<goal_id>/create-task", data = "<form>")]
pub fn create_goal_task(
    ctx: RequestContext,
    goal_id: GoalID,
    form: Form<TaskForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;
    let input = form.validate(ctx.today)?;
    let (goal, task) = create_task_for_goal(&db_connection, &ctx, goal_id, input)?;

    Ok(Flash::success(
        Redirect::to(goal_url(goal.id)),
        format!("Task \"{}\" created for goal \"{}\".", task.title, goal.title),
    ))
}

#[derive(Responder)]
pub enum ToggleResponse {
    Json(Json<ToggleResult>),
    Redirect(Flash<Redirect>),
}

#[post("/goals/<goal_id>/tasks/<task_id>/toggle")]
pub fn toggle_task(
    ctx: RequestContext,
    goal_id: GoalID,
    task_id: TaskID,
    ajax: AjaxRequest,
    db_connection: &State<DBConnection>,
) -> InternalResult<ToggleResponse> {
    let mut db_connection = db_connection.lock()?;

    let result = toggle_goal_task(&mut db_connection, &ctx, goal_id, task_id)?;

    if ajax.0 {
        return Ok(ToggleResponse::Json(Json(result)));
    }

    let state = if result.is_completed {
        "completed"
    } else {
        "incomplete"
    };
    Ok(ToggleResponse::Redirect(Flash::success(
        Redirect::to(goal_url(goal_id)),
        format!("Task \"{}\" marked as {}.", result.title, state),
    )))
}

#[get("/goals/<goal_id>/log-hours")]
pub fn log_hours_page(
    ctx: RequestContext,
    goal_id: GoalID,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<HourLogFormPage>> {
    let db_connection = db_connection.lock()?;

    let goal = get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;

    Ok(Json(HourLogFormPage {
        goal,
        initial_date: ctx.today,
    }))
}

#[post("/goals/<goal_id>/log-hours", data = "<form>")]
pub fn log_hours_submit(
    ctx: RequestContext,
    goal_id: GoalID,
    form: Form<HourLogForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;
    let input = form.validate(ctx.today)?;
    let (goal, hour_log) = log_hours(&db_connection, &ctx, goal_id, input)?;

    Ok(Flash::success(
        Redirect::to(goal_url(goal.id)),
        format!(
            "Successfully logged {} hours for \"{}\".",
            hour_log.hours, goal.title
        ),
    ))
}

#[post("/goals/<goal_id>/progress", data = "<form>")]
pub fn add_progress_submit(
    ctx: RequestContext,
    goal_id: GoalID,
    form: Form<ProgressForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    get_goal_for(&db_connection, &ctx, goal_id, Action::Update)?;
    let input = form.validate(ctx.today)?;
    let (goal, _) = add_progress(&db_connection, &ctx, goal_id, input)?;

    Ok(Flash::success(
        Redirect::to(goal_url(goal.id)),
        "Progress update recorded.",
    ))
}

#[get("/categories")]
pub fn category_list(
    _ctx: RequestContext,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Vec<Category>>> {
    let db_connection = db_connection.lock()?;
    list_categories(&db_connection).map(Json)
}

#[post("/categories/create", data = "<form>")]
pub fn create_category_submit(
    ctx: RequestContext,
    form: Form<CategoryForm>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let db_connection = db_connection.lock()?;

    let input = form.validate()?;
    let category = create_category(&db_connection, &ctx, input)?;

    Ok(Flash::success(
        Redirect::to("/categories/"),
        format!("Category \"{}\" created.", category.name),
    ))
}
