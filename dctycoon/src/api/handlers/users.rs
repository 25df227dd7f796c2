use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::{CurrentUser, ListUsersQuery, UserResponse, UserUpdate};
use crate::auth::permissions::require_admin;
use crate::db::handlers::{Repository, Users, users::UserFilter};
use crate::db::models::users::UserUpdateDBRequest;
use crate::errors::{Error, Result};
use crate::types::{Operation, Resource, UserId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    require_admin(&current_user, Operation::Read, Resource::Users)?;

    let (skip, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let users = repo.list(&UserFilter::new(skip, limit)).await?;
    let total_count = repo.count().await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    tag = "admin",
    summary = "Activate, deactivate, promote or demote a user",
    request_body = UserUpdate,
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Admins cannot lock themselves out"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    current_user: CurrentUser,
    Json(request): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    require_admin(&current_user, Operation::Update, Resource::Users)?;

    if id == current_user.id && (request.is_active == Some(false) || request.is_admin == Some(false)) {
        return Err(Error::BadRequest {
            message: "Admins cannot deactivate or demote themselves".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .update(
            id,
            &UserUpdateDBRequest {
                is_active: request.is_active,
                is_admin: request.is_admin,
                password_hash: None,
            },
        )
        .await
        .map_err(|e| match e {
            crate::db::errors::DbError::NotFound => Error::not_found("User", id),
            other => Error::Database(other),
        })?;

    Ok(Json(UserResponse::from(user)))
}
