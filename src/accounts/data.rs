use chrono::{NaiveDate, NaiveDateTime, Utc};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::FromForm;
use serde::Serialize;
use tracing::warn;

use crate::data::DBConnection;
use crate::internal_error::InternalError;

use super::helpers::get_identity;

pub type IdentityID = i64;

pub const SESSION_COOKIE: &str = "user_id";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityID,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub date_joined: NaiveDateTime,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub identity_id: IdentityID,
    pub bio: String,
    pub birth_date: Option<NaiveDate>,
    pub picture: String,
}

/// Who is acting and what day it is for them.
///
/// Every workflow and aggregate takes this explicitly instead of reaching
/// for the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Identity,
    pub today: NaiveDate,
    pub now: NaiveDateTime,
}

impl RequestContext {
    pub fn new(actor: Identity, now: NaiveDateTime) -> RequestContext {
        RequestContext {
            actor,
            today: now.date(),
            now,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.actor.is_staff
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestContext {
    type Error = InternalError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let user_id = match request
            .cookies()
            .get_private(SESSION_COOKIE)
            .and_then(|cookie| cookie.value().parse::<IdentityID>().ok())
        {
            Some(user_id) => user_id,
            None => return Outcome::Error((Status::Unauthorized, InternalError::Unauthenticated)),
        };

        let db_connection = match request.rocket().state::<DBConnection>() {
            Some(db_connection) => db_connection,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    InternalError::from("Database is not attached"),
                ))
            }
        };

        let identity = match db_connection.lock() {
            Ok(connection) => get_identity(&connection, user_id),
            Err(e) => Err(InternalError::from(e)),
        };

        match identity {
            Ok(Some(actor)) => Outcome::Success(RequestContext::new(actor, Utc::now().naive_utc())),
            Ok(None) => {
                warn!(user_id, "Session refers to a user that no longer exists");
                request.cookies().remove_private(SESSION_COOKIE);
                Outcome::Error((Status::Unauthorized, InternalError::Unauthenticated))
            }
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

/// `true` when the request was sent by page script rather than a form post.
pub struct AjaxRequest(pub bool);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AjaxRequest {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let header = request.headers().get_one("X-Requested-With");
        Outcome::Success(AjaxRequest(header == Some("XMLHttpRequest")))
    }
}

#[derive(FromForm, Debug)]
pub struct LoginForm {
    #[field(default = String::new())]
    pub username: String,
    #[field(default = String::new())]
    pub password: String,
}

#[derive(FromForm, Debug)]
pub struct RegisterForm {
    #[field(default = String::new())]
    pub username: String,
    #[field(default = String::new())]
    pub password1: String,
    #[field(default = String::new())]
    pub password2: String,
    pub is_admin: Option<String>,
}

pub struct NewIdentity {
    pub username: String,
    pub password: String,
    pub is_staff: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub username: String,
    /// The actor removed their own account and must be signed out.
    pub was_self: bool,
}

#[derive(Serialize, Debug)]
pub struct FlashView {
    pub kind: String,
    pub message: String,
}

impl FlashView {
    pub fn from_flash(flash: Option<rocket::request::FlashMessage<'_>>) -> Option<FlashView> {
        flash.map(|flash| FlashView {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        })
    }
}

#[derive(Serialize, Debug)]
pub struct LoginPage {
    pub messages: Option<FlashView>,
}

#[derive(Serialize, Debug)]
pub struct RegisterPage {
    pub allow_staff_registration: bool,
    pub messages: Option<FlashView>,
}
