use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::response::Redirect;
use rocket::serde::json::{json, Value};
use rocket::{catch, catchers, routes, Build, Request, Rocket};
use tracing::error;

use std::sync::{Arc, Mutex};

pub mod accounts;
pub mod config;
pub mod data;
pub mod forms;
pub mod goals;
pub mod internal_error;
pub mod policy;
pub mod stats;
pub mod tasks;

use config::AppConfig;
use data::{open_database, DBConnection};

#[catch(401)]
fn unauthorized() -> Redirect {
    Redirect::to("/login/")
}

#[catch(403)]
fn forbidden() -> Value {
    json!({ "error": "Forbidden" })
}

#[catch(404)]
fn not_found(request: &Request) -> Value {
    json!({ "error": format!("{} not found", request.uri()) })
}

/// Assembles the application on top of `figment`, which carries both
/// Rocket's settings and the `AppConfig` keys.
pub fn build(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(AdHoc::config::<AppConfig>())
        .attach(AdHoc::try_on_ignite("SQLite database", |rocket| async move {
            let config: AppConfig = match rocket.figment().extract() {
                Ok(config) => config,
                Err(e) => {
                    error!("Invalid configuration: {}", e);
                    return Err(rocket);
                }
            };

            match open_database(&config.database_path) {
                Ok(connection) => {
                    let db_connection: DBConnection = Arc::new(Mutex::new(connection));
                    Ok(rocket.manage(db_connection))
                }
                Err(e) => {
                    error!(path = %config.database_path, "Could not open database: {}", e);
                    Err(rocket)
                }
            }
        }))
        .mount(
            "/",
            routes![
                accounts::endpoints::login_page,
                accounts::endpoints::login,
                accounts::endpoints::logout,
                accounts::endpoints::register_page,
                accounts::endpoints::register,
                accounts::endpoints::user_page,
                accounts::endpoints::delete_user,
                stats::endpoints::dashboard_page,
                stats::endpoints::community,
                stats::endpoints::task_completion_data,
                tasks::endpoints::task_list,
                tasks::endpoints::create_task_page,
                tasks::endpoints::create_task,
                tasks::endpoints::update_task_page,
                tasks::endpoints::update_task,
                tasks::endpoints::delete_task,
                tasks::endpoints::toggle_task,
                goals::endpoints::goal_list,
                goals::endpoints::create_goal_page,
                goals::endpoints::create_goal_submit,
                goals::endpoints::goal_page,
                goals::endpoints::update_goal_page,
                goals::endpoints::update_goal_submit,
                goals::endpoints::delete_goal_submit,
                goals::endpoints::add_task,
                goals::endpoints::create_goal_task_page,
                goals::endpoints::create_goal_task,
                goals::endpoints::toggle_task,
                goals::endpoints::log_hours_page,
                goals::endpoints::log_hours_submit,
                goals::endpoints::add_progress_submit,
                goals::endpoints::category_list,
                goals::endpoints::create_category_submit,
            ],
        )
        .register("/", catchers![unauthorized, forbidden, not_found])
}
