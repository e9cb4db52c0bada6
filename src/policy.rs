//! Who may do what to which record.
//!
//! Decisions are recomputed on every request from the actor loaded by the
//! session guard; nothing here is cached.

use serde::Serialize;

use crate::accounts::data::{Identity, IdentityID};
use crate::internal_error::{InternalError, InternalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Update,
    Delete,
}

/// The ownership facts the policy needs about a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Goal { owner: IdentityID },
    UserTask { owner: IdentityID },
    Identity { id: IdentityID },
}

pub fn can(actor: &Identity, action: Action, resource: Resource) -> bool {
    match (action, resource) {
        // Regular users may edit their own records but never delete them
        (Action::Delete, Resource::Goal { .. }) | (Action::Delete, Resource::UserTask { .. }) => {
            actor.is_staff
        }
        (_, Resource::Goal { owner }) | (_, Resource::UserTask { owner }) => {
            owner == actor.id || actor.is_staff
        }
        // Profiles are public to every signed-in user
        (Action::Read, Resource::Identity { .. }) => true,
        (_, Resource::Identity { id }) => id == actor.id || actor.is_staff,
    }
}

/// Turns a denial into the outcome the client sees.
///
/// Records the actor may not read or update are reported as missing so
/// their existence is not revealed; delete denials are reported as such.
pub fn authorize(
    actor: &Identity,
    action: Action,
    resource: Resource,
    kind: &'static str,
) -> InternalResult<()> {
    if can(actor, action, resource) {
        return Ok(());
    }

    match action {
        Action::Read | Action::Update => Err(InternalError::NotFound(kind)),
        Action::Delete => Err(InternalError::Forbidden(format!(
            "You do not have permission to delete this {}.",
            kind.to_lowercase()
        ))),
    }
}
