use rocket::request::FlashMessage;
use rocket::serde::json::Json;
use rocket::{get, State};

use crate::accounts::data::{FlashView, RequestContext};
use crate::data::DBConnection;
use crate::internal_error::InternalResult;

use super::data::*;
use super::helpers::*;

#[get("/")]
pub fn dashboard_page(
    ctx: RequestContext,
    flash: Option<FlashMessage<'_>>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<DashboardPage>> {
    let mut db_connection = db_connection.lock()?;

    let mut page = dashboard(&mut db_connection, &ctx)?;
    page.messages = FlashView::from_flash(flash);

    Ok(Json(page))
}

#[get("/community?<sort_by>")]
pub fn community(
    ctx: RequestContext,
    sort_by: Option<&str>,
    flash: Option<FlashMessage<'_>>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<CommunityPage>> {
    let mut db_connection = db_connection.lock()?;

    let sort_by = SortKey::from_query(sort_by);
    let user_stats = leaderboard(&mut db_connection, ctx.actor.id, sort_by)?;

    Ok(Json(CommunityPage {
        user_stats,
        sort_by,
        is_admin: ctx.is_staff(),
        messages: FlashView::from_flash(flash),
    }))
}

#[get("/task-completion-data")]
pub fn task_completion_data(
    ctx: RequestContext,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<Vec<DayCount>>> {
    let db_connection = db_connection.lock()?;

    daily_completion_histogram(&db_connection, ctx.actor.id, ctx.today, HISTOGRAM_DAYS).map(Json)
}
