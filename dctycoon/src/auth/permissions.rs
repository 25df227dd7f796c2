//! Access checks shared by the handlers.
//!
//! Players only ever see their own entities. Another player's entity is reported as missing
//! rather than forbidden, so ids cannot be probed. Admins see everything.

use crate::{
    api::models::users::CurrentUser,
    errors::{Error, Result},
    types::{Operation, Resource, UserId},
};

/// Fail with 403 unless the user is an admin
pub fn require_admin(user: &CurrentUser, action: Operation, resource: Resource) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}

/// Fail with 404 unless the user owns the entity or is an admin
pub fn ensure_owner(user: &CurrentUser, owner_id: UserId, resource: &str, id: impl ToString) -> Result<()> {
    if user.is_admin || user.id == owner_id {
        Ok(())
    } else {
        Err(Error::not_found(resource, id))
    }
}

/// Owner filter for list queries: `None` for admins, the caller otherwise
pub fn owner_scope(user: &CurrentUser) -> Option<UserId> {
    (!user.is_admin).then_some(user.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn user(is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            email: "u@example.com".to_string(),
            is_admin,
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&user(true), Operation::Read, Resource::Users).is_ok());

        let err = require_admin(&user(false), Operation::Read, Resource::Users).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_foreign_entities_look_missing() {
        let player = user(false);
        let other = Uuid::new_v4();

        assert!(ensure_owner(&player, player.id, "Rack", "r").is_ok());
        let err = ensure_owner(&player, other, "Rack", "r").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        assert!(ensure_owner(&user(true), other, "Rack", "r").is_ok());
    }

    #[test]
    fn test_owner_scope() {
        let player = user(false);
        assert_eq!(owner_scope(&player), Some(player.id));
        assert_eq!(owner_scope(&user(true)), None);
    }
}
