use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    db::handlers::{Repository, Users},
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

/// Header the game client sends the token in
pub const ACCESS_TOKEN_HEADER: &str = "access-token";

/// Pull the raw token from `access-token` or `Authorization: Bearer`.
/// Returns:
/// - None: No token present
/// - Some(Ok(token)): A token was found
/// - Some(Err(error)): A header was present but unreadable
fn extract_token(parts: &Parts) -> Option<Result<&str>> {
    if let Some(value) = parts.headers.get(ACCESS_TOKEN_HEADER) {
        return Some(value.to_str().map(str::trim).map_err(|e| Error::BadRequest {
            message: format!("Invalid {ACCESS_TOKEN_HEADER} header: {e}"),
        }));
    }

    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    auth_str.strip_prefix("Bearer ").map(|token| Ok(token.trim()))
}

#[instrument(skip(parts, config))]
fn try_jwt_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    match extract_token(parts)? {
        Ok(token) => Some(session::verify_session_token(token, config)),
        Err(e) => Some(Err(e)),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let claimed = match try_jwt_auth(parts, &state.config) {
            Some(Ok(user)) => user,
            Some(Err(e)) => {
                trace!("JWT authentication failed: {:?}", e);
                return Err(match e {
                    Error::Internal { .. } => e,
                    _ => Error::Unauthenticated {
                        message: Some("Invalid or expired token".to_string()),
                    },
                });
            }
            None => {
                trace!("No authentication credentials found in request");
                return Err(Error::Unauthenticated { message: None });
            }
        };

        // Tokens outlive account changes, so the account is re-read on every request
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let user = Users::new(&mut conn)
            .get_by_id(claimed.id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| Error::Unauthenticated {
                message: Some("Account no longer active".to_string()),
            })?;

        debug!("Authenticated user: {}", user.id);
        Ok(CurrentUser::from(user))
    }
}
