use crate::api::handlers::datacenters::owned_datacenter;
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::services::{ListServicesQuery, ServiceCreate, ServiceResponse, ServiceUpdate};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{Repository, Services, services::ServiceFilter};
use crate::db::models::services::{ServiceCreateDBRequest, ServiceDBResponse, ServiceUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::ServiceId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use validator::Validate;

pub(crate) async fn owned_service(conn: &mut PgConnection, user: &CurrentUser, id: ServiceId) -> Result<ServiceDBResponse> {
    let service = Services::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Service", id))?;
    ensure_owner(user, service.owner_id, "Service", id)?;

    Ok(service)
}

#[utoipa::path(
    get,
    path = "/services",
    tag = "services",
    summary = "List hosted services",
    params(ListServicesQuery),
    responses(
        (status = 200, description = "Paginated list of services", body = PaginatedResponse<ServiceResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ListServicesQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<ServiceResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ServiceFilter {
        owner_id: owner_scope(&current_user),
        datacenter_id: query.datacenter_id,
        skip,
        limit,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Services::new(&mut conn);
    let services = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        services.into_iter().map(ServiceResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/services",
    tag = "services",
    summary = "Launch a service in a datacenter",
    request_body = ServiceCreate,
    responses(
        (status = 201, description = "Service created", body = ServiceResponse),
        (status = 404, description = "Datacenter not found"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_service(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ServiceCreate>,
) -> Result<(StatusCode, Json<ServiceResponse>)> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let datacenter = owned_datacenter(&mut conn, &current_user, request.datacenter_id).await?;

    let service = Services::new(&mut conn)
        .create(&ServiceCreateDBRequest {
            owner_id: datacenter.owner_id,
            datacenter_id: datacenter.id,
            name: request.name,
            service_type: request.service_type,
            monthly_price: request.monthly_price,
            uptime_percent: request.uptime_percent,
            avg_latency_ms: request.avg_latency_ms,
            throughput_mbps: request.throughput_mbps,
            status: request.status,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ServiceResponse::from(service))))
}

#[utoipa::path(
    get,
    path = "/services/{id}",
    tag = "services",
    summary = "Get a service",
    params(("id" = uuid::Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service", body = ServiceResponse),
        (status = 404, description = "Service not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_service(State(state): State<AppState>, Path(id): Path<ServiceId>, current_user: CurrentUser) -> Result<Json<ServiceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let service = owned_service(&mut conn, &current_user, id).await?;

    Ok(Json(ServiceResponse::from(service)))
}

#[utoipa::path(
    patch,
    path = "/services/{id}",
    tag = "services",
    summary = "Update a service",
    request_body = ServiceUpdate,
    params(("id" = uuid::Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Updated service", body = ServiceResponse),
        (status = 404, description = "Service not found"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<ServiceId>,
    current_user: CurrentUser,
    Json(request): Json<ServiceUpdate>,
) -> Result<Json<ServiceResponse>> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_service(&mut conn, &current_user, id).await?;

    let service = Services::new(&mut conn)
        .update(
            id,
            &ServiceUpdateDBRequest {
                name: request.name,
                service_type: request.service_type,
                monthly_price: request.monthly_price,
                uptime_percent: request.uptime_percent,
                avg_latency_ms: request.avg_latency_ms,
                throughput_mbps: request.throughput_mbps,
                status: request.status,
            },
        )
        .await?;

    Ok(Json(ServiceResponse::from(service)))
}

#[utoipa::path(
    delete,
    path = "/services/{id}",
    tag = "services",
    summary = "Shut down a service. Linked contracts keep running without it.",
    params(("id" = uuid::Uuid, Path, description = "Service ID")),
    responses(
        (status = 204, description = "Service deleted"),
        (status = 404, description = "Service not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_service(State(state): State<AppState>, Path(id): Path<ServiceId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_service(&mut conn, &current_user, id).await?;

    if Services::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Service", id))
    }
}
