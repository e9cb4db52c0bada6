use chrono::Utc;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use tracing::error;

use crate::config::AppConfig;
use crate::data::DBConnection;
use crate::internal_error::{InternalError, InternalResult};
use crate::stats::data::UserDetailPage;
use crate::stats::helpers::user_detail;

use super::data::*;
use super::helpers::*;

fn sign_in(cookies: &CookieJar<'_>, identity: &Identity) {
    cookies.add_private(Cookie::new(SESSION_COOKIE, identity.id.to_string()));
}

#[get("/login")]
pub fn login_page(flash: Option<FlashMessage<'_>>) -> Json<LoginPage> {
    Json(LoginPage {
        messages: FlashView::from_flash(flash),
    })
}

#[post("/login", data = "<form>")]
pub fn login(
    form: Form<LoginForm>,
    cookies: &CookieJar<'_>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    match authenticate(db_connection, &form.username, &form.password)? {
        Some(identity) => {
            sign_in(cookies, &identity);
            Ok(Flash::success(Redirect::to("/"), "Login Successful!"))
        }
        None => Ok(Flash::error(
            Redirect::to("/login/"),
            "Invalid username or password.",
        )),
    }
}

#[get("/logout")]
pub fn logout(_ctx: RequestContext, cookies: &CookieJar<'_>) -> Flash<Redirect> {
    cookies.remove_private(SESSION_COOKIE);
    Flash::success(Redirect::to("/"), "You have been logged out successfully!")
}

#[get("/register")]
pub fn register_page(
    config: &State<AppConfig>,
    flash: Option<FlashMessage<'_>>,
) -> Json<RegisterPage> {
    Json(RegisterPage {
        allow_staff_registration: config.allow_staff_registration,
        messages: FlashView::from_flash(flash),
    })
}

#[post("/register", data = "<form>")]
pub fn register(
    form: Form<RegisterForm>,
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let identity = register_identity(
        db_connection,
        &form,
        config.allow_staff_registration,
        Utc::now().naive_utc(),
    )?;
    sign_in(cookies, &identity);

    let message = if identity.is_staff {
        "Admin user created successfully!"
    } else {
        "Registration successful!"
    };
    Ok(Flash::success(Redirect::to("/"), message))
}

#[get("/users/<user_id>")]
pub fn user_page(
    ctx: RequestContext,
    user_id: IdentityID,
    flash: Option<FlashMessage<'_>>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Json<UserDetailPage>> {
    let mut db_connection = db_connection.lock()?;

    let mut page = user_detail(&mut db_connection, &ctx, user_id)?;
    page.messages = FlashView::from_flash(flash);

    Ok(Json(page))
}

#[post("/users/<user_id>/delete")]
pub fn delete_user(
    ctx: RequestContext,
    user_id: IdentityID,
    cookies: &CookieJar<'_>,
    db_connection: &State<DBConnection>,
) -> InternalResult<Flash<Redirect>> {
    let mut db_connection = db_connection.lock()?;

    match delete_identity(&mut db_connection, &ctx, user_id) {
        Ok(outcome) if outcome.was_self => {
            cookies.remove_private(SESSION_COOKIE);
            Ok(Flash::success(
                Redirect::to("/"),
                "Your account has been deleted.",
            ))
        }
        Ok(outcome) => Ok(Flash::success(
            Redirect::to("/community/"),
            format!("User \"{}\" has been deleted.", outcome.username),
        )),
        Err(InternalError::Forbidden(message)) => {
            Ok(Flash::error(Redirect::to("/community/"), message))
        }
        Err(InternalError::NotFound(kind)) => Err(InternalError::NotFound(kind)),
        Err(e) => {
            error!(user_id, "Error deleting user: {}", e);
            Ok(Flash::error(
                Redirect::to(format!("/users/{}/", user_id)),
                format!("Error deleting user: {}", e),
            ))
        }
    }
}
