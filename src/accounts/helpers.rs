use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{info, warn};

use crate::forms::Validator;
use crate::goals::helpers::delete_goal_rows;
use crate::internal_error::{InternalError, InternalResult};
use crate::policy::{can, Action, Resource};

use super::data::*;

const IDENTITY_COLUMNS: &str = "id, username, password_hash, is_staff, date_joined";
const USERNAME_MAX_LEN: usize = 150;
const PASSWORD_MIN_LEN: usize = 8;

pub fn hash_password(password: &str) -> InternalResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> InternalResult<bool> {
    let parsed_hash = PasswordHash::new(hash)?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn identity_from_row(row: &Row) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        is_staff: row.get(3)?,
        date_joined: row.get(4)?,
    })
}

pub fn get_identity(db_connection: &Connection, id: IdentityID) -> InternalResult<Option<Identity>> {
    let identity = db_connection
        .query_row(
            &format!("SELECT {} FROM identities WHERE id = ?1", IDENTITY_COLUMNS),
            params![id],
            identity_from_row,
        )
        .optional()?;

    Ok(identity)
}

pub fn get_identity_by_username(
    db_connection: &Connection,
    username: &str,
) -> InternalResult<Option<Identity>> {
    let identity = db_connection
        .query_row(
            &format!("SELECT {} FROM identities WHERE username = ?1", IDENTITY_COLUMNS),
            params![username],
            identity_from_row,
        )
        .optional()?;

    Ok(identity)
}

/// Every identity, ordered by username.
pub fn list_identities(db_connection: &Connection) -> InternalResult<Vec<Identity>> {
    let mut statement = db_connection.prepare(&format!(
        "SELECT {} FROM identities ORDER BY username",
        IDENTITY_COLUMNS
    ))?;

    let identities = statement
        .query_map([], identity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(identities)
}

pub fn get_profile(db_connection: &Connection, id: IdentityID) -> InternalResult<Option<Profile>> {
    let profile = db_connection
        .query_row(
            "SELECT identity_id, bio, birth_date, picture FROM profiles WHERE identity_id = ?1",
            params![id],
            |row| {
                Ok(Profile {
                    identity_id: row.get(0)?,
                    bio: row.get(1)?,
                    birth_date: row.get(2)?,
                    picture: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(profile)
}

impl RegisterForm {
    pub fn validate(
        &self,
        db_connection: &Connection,
        allow_staff_registration: bool,
    ) -> InternalResult<NewIdentity> {
        let mut validator = Validator::new();

        let username = validator.required_text("username", &self.username, USERNAME_MAX_LEN);
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            validator.error(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if !username.is_empty() && get_identity_by_username(db_connection, &username)?.is_some() {
            validator.error("username", "A user with that username already exists.");
        }

        if self.password1.is_empty() {
            validator.error("password1", "This field is required.");
        } else if self.password1 != self.password2 {
            validator.error("password2", "The two password fields didn't match.");
        } else {
            if self.password1.chars().count() < PASSWORD_MIN_LEN {
                validator.error(
                    "password2",
                    format!(
                        "This password is too short. It must contain at least {} characters.",
                        PASSWORD_MIN_LEN
                    ),
                );
            }
            if self.password1.chars().all(|c| c.is_ascii_digit()) {
                validator.error("password2", "This password is entirely numeric.");
            }
        }

        let is_staff = allow_staff_registration && self.is_admin.as_deref() == Some("true");

        validator.finish(NewIdentity {
            username,
            password: self.password1.clone(),
            is_staff,
        })
    }
}

/// Creates the identity together with its empty profile. The username is
/// checked again inside the transaction since validation ran under an
/// earlier lock.
pub fn create_identity(
    db_connection: &mut Connection,
    new_identity: NewIdentity,
    password_hash: String,
    now: NaiveDateTime,
) -> InternalResult<Identity> {
    let tx = db_connection.transaction()?;
    if get_identity_by_username(&tx, &new_identity.username)?.is_some() {
        return Err(InternalError::invalid(
            "username",
            "A user with that username already exists.",
        ));
    }

    tx.execute(
        "INSERT INTO identities (username, password_hash, is_staff, date_joined) VALUES (?1, ?2, ?3, ?4)",
        params![new_identity.username, password_hash, new_identity.is_staff, now],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute("INSERT INTO profiles (identity_id) VALUES (?1)", params![id])?;
    tx.commit()?;

    info!(id, username = %new_identity.username, is_staff = new_identity.is_staff, "Registered user");

    Ok(Identity {
        id,
        username: new_identity.username,
        password_hash,
        is_staff: new_identity.is_staff,
        date_joined: now,
    })
}

/// Validates the form and creates the identity. The password is hashed
/// with the connection unlocked.
pub fn register_identity(
    db_connection: &Mutex<Connection>,
    form: &RegisterForm,
    allow_staff_registration: bool,
    now: NaiveDateTime,
) -> InternalResult<Identity> {
    let new_identity = {
        let db_connection = db_connection.lock()?;
        form.validate(&db_connection, allow_staff_registration)?
    };

    let password_hash = hash_password(&new_identity.password)?;

    let mut db_connection = db_connection.lock()?;
    create_identity(&mut db_connection, new_identity, password_hash, now)
}

/// Returns the identity when the credentials match, `None` otherwise. The
/// lock is only held for the lookup.
pub fn authenticate(
    db_connection: &Mutex<Connection>,
    username: &str,
    password: &str,
) -> InternalResult<Option<Identity>> {
    let identity = {
        let db_connection = db_connection.lock()?;
        get_identity_by_username(&db_connection, username)?
    };

    let identity = match identity {
        Some(identity) => identity,
        None => {
            warn!(username, "Login attempt for unknown user");
            return Ok(None);
        }
    };

    if verify_password(password, &identity.password_hash)? {
        Ok(Some(identity))
    } else {
        warn!(username, "Login attempt with wrong password");
        Ok(None)
    }
}

fn remove_identity_rows(tx: &Transaction, id: IdentityID) -> InternalResult<()> {
    tx.execute(
        "DELETE FROM goal_categories WHERE goal_id IN (SELECT id FROM goals WHERE owner_id = ?1)",
        params![id],
    )?;

    let goal_ids = {
        let mut statement = tx.prepare("SELECT id FROM goals WHERE owner_id = ?1")?;
        let ids = statement
            .query_map(params![id], |row| row.get::<usize, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids
    };

    for goal_id in goal_ids {
        delete_goal_rows(tx, goal_id)?;
    }

    tx.execute("DELETE FROM user_tasks WHERE owner_id = ?1", params![id])?;
    tx.execute("DELETE FROM profiles WHERE identity_id = ?1", params![id])?;
    tx.execute("DELETE FROM identities WHERE id = ?1", params![id])?;

    Ok(())
}

/// Removes an account and everything it owns in one transaction.
///
/// Children go before parents: category links, then each goal's tasks,
/// progress updates and hour logs, then the goals, the user's own tasks,
/// the profile and finally the identity. If any step fails nothing is
/// removed.
pub fn delete_identity(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    target_id: IdentityID,
) -> InternalResult<DeletionOutcome> {
    let target = get_identity(db_connection, target_id)?.ok_or(InternalError::NotFound("User"))?;

    if !can(&ctx.actor, Action::Delete, Resource::Identity { id: target.id }) {
        warn!(actor = ctx.actor.id, target = target.id, "Refused user deletion");
        return Err(InternalError::Forbidden(
            "You don't have permission to delete users.".to_string(),
        ));
    }

    let tx = db_connection.transaction()?;
    remove_identity_rows(&tx, target.id)?;
    tx.commit()?;

    info!(actor = ctx.actor.id, target = target.id, username = %target.username, "Deleted user");

    Ok(DeletionOutcome {
        username: target.username,
        was_self: target.id == ctx.actor.id,
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::data::open_test_database;
    use chrono::NaiveDate;

    pub fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    /// Inserts an identity without paying for a real password hash.
    pub fn insert_identity(db_connection: &Connection, username: &str, is_staff: bool) -> Identity {
        db_connection
            .execute(
                "INSERT INTO identities (username, password_hash, is_staff, date_joined) VALUES (?1, 'x', ?2, ?3)",
                params![username, is_staff, now()],
            )
            .unwrap();
        let id = db_connection.last_insert_rowid();
        db_connection
            .execute("INSERT INTO profiles (identity_id) VALUES (?1)", params![id])
            .unwrap();
        get_identity(db_connection, id).unwrap().unwrap()
    }

    fn register_form(username: &str, password1: &str, password2: &str) -> RegisterForm {
        RegisterForm {
            username: username.to_string(),
            password1: password1.to_string(),
            password2: password2.to_string(),
            is_admin: Some("true".to_string()),
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn register_then_authenticate() {
        let db_connection = Mutex::new(open_test_database());
        let form = register_form("alice", "s3cret-pass", "s3cret-pass");

        let alice = register_identity(&db_connection, &form, false, now()).unwrap();
        assert!(!alice.is_staff);
        assert!(get_profile(&db_connection.lock().unwrap(), alice.id)
            .unwrap()
            .is_some());

        let found = authenticate(&db_connection, "alice", "s3cret-pass").unwrap();
        assert_eq!(found.map(|identity| identity.id), Some(alice.id));
        assert_eq!(authenticate(&db_connection, "alice", "nope").unwrap(), None);
        assert_eq!(authenticate(&db_connection, "bob", "s3cret-pass").unwrap(), None);

        assert!(matches!(
            register_identity(&db_connection, &form, false, now()),
            Err(InternalError::Validation(_))
        ));
    }

    #[test]
    fn create_rechecks_a_username_taken_after_validation() {
        let mut db_connection = open_test_database();
        let new_identity = register_form("alice", "s3cret-pass", "s3cret-pass")
            .validate(&db_connection, false)
            .unwrap();
        insert_identity(&db_connection, "alice", false);

        let result = create_identity(&mut db_connection, new_identity, "x".to_string(), now());
        match result {
            Err(InternalError::Validation(fields)) => assert_eq!(fields[0].field, "username"),
            other => panic!("expected a validation error, got {:?}", other),
        }
        assert_eq!(list_identities(&db_connection).unwrap().len(), 1);
    }

    #[test]
    fn staff_flag_requires_configuration() {
        let db_connection = open_test_database();
        let form = register_form("root", "s3cret-pass", "s3cret-pass");

        assert!(!form.validate(&db_connection, false).unwrap().is_staff);
        assert!(form.validate(&db_connection, true).unwrap().is_staff);
    }

    #[test]
    fn registration_rejects_bad_input() {
        let db_connection = open_test_database();
        insert_identity(&db_connection, "taken", false);

        let cases = [
            register_form("taken", "s3cret-pass", "s3cret-pass"),
            register_form("", "s3cret-pass", "s3cret-pass"),
            register_form("bad name", "s3cret-pass", "s3cret-pass"),
            register_form("carol", "s3cret-pass", "other-pass"),
            register_form("carol", "short", "short"),
            register_form("carol", "1234567890", "1234567890"),
        ];

        for form in cases {
            assert!(
                matches!(
                    form.validate(&db_connection, false),
                    Err(InternalError::Validation(_))
                ),
                "{:?} should be rejected",
                form
            );
        }
    }

    #[test]
    fn identities_are_listed_by_username() {
        let db_connection = open_test_database();
        insert_identity(&db_connection, "zed", false);
        insert_identity(&db_connection, "amy", false);
        insert_identity(&db_connection, "mia", false);

        let names: Vec<String> = list_identities(&db_connection)
            .unwrap()
            .into_iter()
            .map(|identity| identity.username)
            .collect();
        assert_eq!(names, vec!["amy", "mia", "zed"]);
    }

    fn populate(db_connection: &mut Connection, owner: &Identity) {
        use crate::goals::data::CategoryInput;
        use crate::goals::helpers::tests::{ctx_for, goal_input, task_input};
        use crate::goals::helpers::{create_category, create_goal, create_task_for_goal};
        use crate::tasks::data::{UserTaskInput, UserTaskStatus};
        use crate::tasks::helpers::create_user_task;

        let admin = get_identity_by_username(db_connection, "admin").unwrap().unwrap();
        let category = create_category(
            db_connection,
            &ctx_for(&admin),
            CategoryInput {
                name: format!("{} things", owner.username),
                description: String::new(),
                color: "#007bff".to_string(),
            },
        )
        .unwrap();

        let ctx = ctx_for(owner);
        let mut input = goal_input("Everything");
        input.categories = vec![category.id];
        let goal = create_goal(db_connection, &ctx, input).unwrap();
        create_task_for_goal(db_connection, &ctx, goal.id, task_input("Step", true)).unwrap();
        db_connection
            .execute(
                "INSERT INTO hour_logs (goal_id, date, hours_centi, created_at) VALUES (?1, ?2, 150, ?3)",
                params![goal.id, now().date(), now()],
            )
            .unwrap();
        db_connection
            .execute(
                "INSERT INTO progress_updates (goal_id, date, note) VALUES (?1, ?2, 'halfway')",
                params![goal.id, now().date()],
            )
            .unwrap();
        create_user_task(
            db_connection,
            &ctx,
            UserTaskInput {
                owner_id: owner.id,
                title: "Chore".to_string(),
                description: String::new(),
                status: UserTaskStatus::Todo,
                priority: Default::default(),
                due_date: None,
            },
        )
        .unwrap();
    }

    fn owned_rows(db_connection: &Connection, id: IdentityID) -> i64 {
        db_connection
            .query_row(
                "SELECT (SELECT COUNT(*) FROM goals WHERE owner_id = ?1) \
                 + (SELECT COUNT(*) FROM goal_tasks t JOIN goals g ON g.id = t.goal_id WHERE g.owner_id = ?1) \
                 + (SELECT COUNT(*) FROM user_tasks WHERE owner_id = ?1) \
                 + (SELECT COUNT(*) FROM profiles WHERE identity_id = ?1) \
                 + (SELECT COUNT(*) FROM identities WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn context(identity: &Identity) -> RequestContext {
        RequestContext::new(identity.clone(), now())
    }

    #[test]
    fn deleting_a_user_leaves_no_orphans() {
        let mut db_connection = open_test_database();
        let admin = insert_identity(&db_connection, "admin", true);
        let alice = insert_identity(&db_connection, "alice", false);
        let bob = insert_identity(&db_connection, "bob", false);
        populate(&mut db_connection, &alice);
        populate(&mut db_connection, &bob);
        let bob_rows = owned_rows(&db_connection, bob.id);

        let outcome = delete_identity(&mut db_connection, &context(&admin), alice.id).unwrap();
        assert_eq!(
            outcome,
            DeletionOutcome {
                username: "alice".to_string(),
                was_self: false,
            }
        );

        assert_eq!(owned_rows(&db_connection, alice.id), 0);
        assert_eq!(owned_rows(&db_connection, bob.id), bob_rows);
        for table in ["goal_tasks", "progress_updates", "hour_logs", "goal_categories"] {
            let orphans: i64 = db_connection
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {} WHERE goal_id NOT IN (SELECT id FROM goals)",
                        table
                    ),
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(orphans, 0, "{}", table);
        }
        let violations: Option<String> = db_connection
            .query_row("PRAGMA foreign_key_check", [], |row| row.get(0))
            .optional()
            .unwrap();
        assert_eq!(violations, None);
    }

    #[test]
    fn failed_deletion_rolls_back() {
        let mut db_connection = open_test_database();
        let admin = insert_identity(&db_connection, "admin", true);
        let alice = insert_identity(&db_connection, "alice", false);
        populate(&mut db_connection, &alice);
        let before = owned_rows(&db_connection, alice.id);

        db_connection
            .execute_batch(
                "CREATE TEMP TRIGGER block_profile_delete BEFORE DELETE ON profiles \
                 BEGIN SELECT RAISE(ABORT, 'profile is locked'); END;",
            )
            .unwrap();

        assert!(matches!(
            delete_identity(&mut db_connection, &context(&admin), alice.id),
            Err(InternalError::Database(_))
        ));
        assert_eq!(owned_rows(&db_connection, alice.id), before);
    }

    #[test]
    fn users_may_delete_themselves_but_not_others() {
        let mut db_connection = open_test_database();
        insert_identity(&db_connection, "admin", true);
        let alice = insert_identity(&db_connection, "alice", false);
        let bob = insert_identity(&db_connection, "bob", false);
        populate(&mut db_connection, &bob);

        assert!(matches!(
            delete_identity(&mut db_connection, &context(&alice), bob.id),
            Err(InternalError::Forbidden(_))
        ));
        assert!(get_identity(&db_connection, bob.id).unwrap().is_some());

        let outcome = delete_identity(&mut db_connection, &context(&bob), bob.id).unwrap();
        assert!(outcome.was_self);
        assert_eq!(owned_rows(&db_connection, bob.id), 0);

        assert!(matches!(
            delete_identity(&mut db_connection, &context(&alice), 999),
            Err(InternalError::NotFound("User"))
        ));
    }
}
