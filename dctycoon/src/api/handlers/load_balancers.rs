use crate::api::handlers::datacenters::owned_datacenter;
use crate::api::models::load_balancers::{
    ListLoadBalancersQuery, LoadBalancerCreate, LoadBalancerResponse, LoadBalancerUpdate, TrafficUpdate, check_capacity,
};
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{LoadBalancers, Repository, load_balancers::LoadBalancerFilter};
use crate::db::models::load_balancers::{LoadBalancerCreateDBRequest, LoadBalancerDBResponse, LoadBalancerUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::LoadBalancerId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use validator::Validate;

async fn owned_balancer(conn: &mut PgConnection, user: &CurrentUser, id: LoadBalancerId) -> Result<LoadBalancerDBResponse> {
    let balancer = LoadBalancers::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Load balancer", id))?;
    ensure_owner(user, balancer.owner_id, "Load balancer", id)?;

    Ok(balancer)
}

/// Apply `update` to the stored balancer, checking the merged backend counts first
async fn apply_update(
    conn: &mut PgConnection,
    existing: &LoadBalancerDBResponse,
    update: LoadBalancerUpdateDBRequest,
) -> Result<LoadBalancerDBResponse> {
    check_capacity(
        update.backend_count.unwrap_or(existing.backend_count),
        update.healthy_backends.unwrap_or(existing.healthy_backends),
    )
    .map_err(|message| Error::validation("__all__", message))?;

    Ok(LoadBalancers::new(conn).update(existing.id, &update).await?)
}

#[utoipa::path(
    get,
    path = "/load-balancers",
    tag = "load-balancers",
    summary = "List load balancers",
    params(ListLoadBalancersQuery),
    responses(
        (status = 200, description = "Paginated list of load balancers", body = PaginatedResponse<LoadBalancerResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_load_balancers(
    State(state): State<AppState>,
    Query(query): Query<ListLoadBalancersQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<LoadBalancerResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = LoadBalancerFilter {
        owner_id: owner_scope(&current_user),
        datacenter_id: query.datacenter_id,
        skip,
        limit,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = LoadBalancers::new(&mut conn);
    let balancers = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        balancers.into_iter().map(LoadBalancerResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/load-balancers",
    tag = "load-balancers",
    summary = "Create a load balancer",
    request_body = LoadBalancerCreate,
    responses(
        (status = 201, description = "Load balancer created", body = LoadBalancerResponse),
        (status = 404, description = "Datacenter not found"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_load_balancer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<LoadBalancerCreate>,
) -> Result<(StatusCode, Json<LoadBalancerResponse>)> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let datacenter = owned_datacenter(&mut conn, &current_user, request.datacenter_id).await?;

    let balancer = LoadBalancers::new(&mut conn)
        .create(&LoadBalancerCreateDBRequest {
            owner_id: datacenter.owner_id,
            datacenter_id: datacenter.id,
            name: request.name,
            algorithm: request.algorithm,
            health_check_enabled: request.health_check_enabled,
            health_check_interval_seconds: request.health_check_interval_seconds,
            ssl_enabled: request.ssl_enabled,
            ddos_protection: request.ddos_protection,
            max_connections: request.max_connections,
            current_connections: request.current_connections,
            backend_count: request.backend_count,
            healthy_backends: request.healthy_backends,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(LoadBalancerResponse::from(balancer))))
}

#[utoipa::path(
    get,
    path = "/load-balancers/{id}",
    tag = "load-balancers",
    summary = "Get a load balancer",
    params(("id" = uuid::Uuid, Path, description = "Load balancer ID")),
    responses(
        (status = 200, description = "Load balancer", body = LoadBalancerResponse),
        (status = 404, description = "Load balancer not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_load_balancer(
    State(state): State<AppState>,
    Path(id): Path<LoadBalancerId>,
    current_user: CurrentUser,
) -> Result<Json<LoadBalancerResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let balancer = owned_balancer(&mut conn, &current_user, id).await?;

    Ok(Json(LoadBalancerResponse::from(balancer)))
}

#[utoipa::path(
    patch,
    path = "/load-balancers/{id}",
    tag = "load-balancers",
    summary = "Reconfigure a load balancer",
    request_body = LoadBalancerUpdate,
    params(("id" = uuid::Uuid, Path, description = "Load balancer ID")),
    responses(
        (status = 200, description = "Updated load balancer", body = LoadBalancerResponse),
        (status = 404, description = "Load balancer not found"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_load_balancer(
    State(state): State<AppState>,
    Path(id): Path<LoadBalancerId>,
    current_user: CurrentUser,
    Json(request): Json<LoadBalancerUpdate>,
) -> Result<Json<LoadBalancerResponse>> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = owned_balancer(&mut conn, &current_user, id).await?;
    let balancer = apply_update(
        &mut conn,
        &existing,
        LoadBalancerUpdateDBRequest {
            name: request.name,
            algorithm: request.algorithm,
            health_check_enabled: request.health_check_enabled,
            health_check_interval_seconds: request.health_check_interval_seconds,
            ssl_enabled: request.ssl_enabled,
            ddos_protection: request.ddos_protection,
            max_connections: request.max_connections,
            backend_count: request.backend_count,
            healthy_backends: request.healthy_backends,
            ..Default::default()
        },
    )
    .await?;

    Ok(Json(LoadBalancerResponse::from(balancer)))
}

#[utoipa::path(
    patch,
    path = "/load-balancers/{id}/traffic",
    tag = "load-balancers",
    summary = "Report current connections and backend health",
    request_body = TrafficUpdate,
    params(("id" = uuid::Uuid, Path, description = "Load balancer ID")),
    responses(
        (status = 200, description = "Load balancer with the new figures", body = LoadBalancerResponse),
        (status = 404, description = "Load balancer not found"),
        (status = 422, description = "Invalid counts"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn report_traffic(
    State(state): State<AppState>,
    Path(id): Path<LoadBalancerId>,
    current_user: CurrentUser,
    Json(request): Json<TrafficUpdate>,
) -> Result<Json<LoadBalancerResponse>> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = owned_balancer(&mut conn, &current_user, id).await?;
    let balancer = apply_update(
        &mut conn,
        &existing,
        LoadBalancerUpdateDBRequest {
            current_connections: request.current_connections,
            healthy_backends: request.healthy_backends,
            ..Default::default()
        },
    )
    .await?;

    Ok(Json(LoadBalancerResponse::from(balancer)))
}

#[utoipa::path(
    delete,
    path = "/load-balancers/{id}",
    tag = "load-balancers",
    summary = "Delete a load balancer",
    params(("id" = uuid::Uuid, Path, description = "Load balancer ID")),
    responses(
        (status = 204, description = "Load balancer deleted"),
        (status = 404, description = "Load balancer not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_load_balancer(
    State(state): State<AppState>,
    Path(id): Path<LoadBalancerId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_balancer(&mut conn, &current_user, id).await?;

    if LoadBalancers::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Load balancer", id))
    }
}
