use rusqlite::Connection;
use tracing::info;

use std::sync::{Arc, Mutex};

use crate::internal_error::InternalResult;

pub type DBConnection = Arc<Mutex<Connection>>;

/// Declares a closed set of values persisted as upper-case text columns and
/// submitted as form choices.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        other
                    )),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|_| rusqlite::types::FromSqlError::InvalidType)
            }
        }

        impl<'v> rocket::form::FromFormField<'v> for $name {
            fn from_value(field: rocket::form::ValueField<'v>) -> rocket::form::Result<'v, Self> {
                field
                    .value
                    .parse()
                    .map_err(|e: String| rocket::form::Error::validation(e).into())
            }
        }
    };
}

pub(crate) use text_enum;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS identities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_staff INTEGER NOT NULL DEFAULT 0,
        date_joined TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity_id INTEGER NOT NULL UNIQUE REFERENCES identities (id),
        bio TEXT NOT NULL DEFAULT '',
        birth_date TEXT,
        picture TEXT NOT NULL DEFAULT 'default.jpg'
    );
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        color TEXT NOT NULL DEFAULT '#007bff'
    );
    CREATE TABLE IF NOT EXISTS goals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL REFERENCES identities (id),
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        priority TEXT NOT NULL DEFAULT 'MEDIUM',
        status TEXT NOT NULL DEFAULT 'NOT_STARTED',
        start_date TEXT NOT NULL,
        target_date TEXT,
        completed_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS goal_categories (
        goal_id INTEGER NOT NULL REFERENCES goals (id),
        category_id INTEGER NOT NULL REFERENCES categories (id),
        PRIMARY KEY (goal_id, category_id)
    );
    CREATE TABLE IF NOT EXISTS goal_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        goal_id INTEGER NOT NULL REFERENCES goals (id),
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        is_completed INTEGER NOT NULL DEFAULT 0,
        due_date TEXT,
        completed_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS progress_updates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        goal_id INTEGER NOT NULL REFERENCES goals (id),
        date TEXT NOT NULL,
        note TEXT NOT NULL,
        value REAL NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS hour_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        goal_id INTEGER NOT NULL REFERENCES goals (id),
        date TEXT NOT NULL,
        hours_centi INTEGER NOT NULL CHECK (hours_centi > 0),
        description TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL REFERENCES identities (id),
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'TODO',
        priority TEXT NOT NULL DEFAULT 'MEDIUM',
        is_completed INTEGER NOT NULL DEFAULT 0,
        due_date TEXT,
        completed_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS goals_owner ON goals (owner_id);
    CREATE INDEX IF NOT EXISTS goal_tasks_goal ON goal_tasks (goal_id);
    CREATE INDEX IF NOT EXISTS hour_logs_goal ON hour_logs (goal_id);
    CREATE INDEX IF NOT EXISTS user_tasks_owner ON user_tasks (owner_id);
";

pub fn init_schema(connection: &Connection) -> InternalResult<()> {
    connection.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn open_database(path: &str) -> InternalResult<Connection> {
    info!("Opening SQLite database at {}", path);

    let connection = Connection::open(path)?;

    let journal_mode: String =
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    info!("SQLite journal mode is {}", journal_mode);
    init_schema(&connection)?;

    Ok(connection)
}

#[cfg(test)]
pub fn open_test_database() -> Connection {
    let connection = Connection::open_in_memory().unwrap();
    connection.pragma_update(None, "foreign_keys", "ON").unwrap();
    init_schema(&connection).unwrap();
    connection
}
