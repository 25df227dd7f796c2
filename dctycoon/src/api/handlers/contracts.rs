use crate::api::handlers::services::owned_service;
use crate::api::models::contracts::{ComplianceResponse, ContractCreate, ContractResponse, ContractUpdate, ListContractsQuery};
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{Contracts, Repository, Services, contracts::ContractFilter};
use crate::db::models::contracts::{ContractCreateDBRequest, ContractDBResponse, ContractStatus, ContractUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::security::sla;
use crate::types::ContractId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use sqlx::PgConnection;
use validator::Validate;

async fn owned_contract(conn: &mut PgConnection, user: &CurrentUser, id: ContractId) -> Result<ContractDBResponse> {
    let contract = Contracts::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Contract", id))?;
    ensure_owner(user, contract.owner_id, "Contract", id)?;

    Ok(contract)
}

#[utoipa::path(
    get,
    path = "/contracts",
    tag = "contracts",
    summary = "List SLA contracts",
    params(ListContractsQuery),
    responses(
        (status = 200, description = "Paginated list of contracts", body = PaginatedResponse<ContractResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_contracts(
    State(state): State<AppState>,
    Query(query): Query<ListContractsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<ContractResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ContractFilter {
        owner_id: owner_scope(&current_user),
        service_id: query.service_id,
        status: query.status,
        skip,
        limit,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Contracts::new(&mut conn);
    let contracts = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        contracts.into_iter().map(ContractResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/contracts",
    tag = "contracts",
    summary = "Sign a contract with a client",
    request_body = ContractCreate,
    responses(
        (status = 201, description = "Contract created", body = ContractResponse),
        (status = 404, description = "Service not found"),
        (status = 422, description = "Invalid dates or thresholds"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_contract(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ContractCreate>,
) -> Result<(StatusCode, Json<ContractResponse>)> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let owner_id = match request.service_id {
        Some(service_id) => owned_service(&mut conn, &current_user, service_id).await?.owner_id,
        None => current_user.id,
    };

    let contract = Contracts::new(&mut conn)
        .create(&ContractCreateDBRequest {
            owner_id,
            service_id: request.service_id,
            client_name: request.client_name,
            monthly_value: request.monthly_value,
            guaranteed_uptime_percent: request.guaranteed_uptime_percent,
            max_latency_ms: request.max_latency_ms,
            min_throughput_mbps: request.min_throughput_mbps,
            penalty_rate_percent: request.penalty_rate_percent,
            start_date: request.start_date.unwrap_or_else(Utc::now),
            end_date: request.end_date,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ContractResponse::from(contract))))
}

#[utoipa::path(
    get,
    path = "/contracts/{id}",
    tag = "contracts",
    summary = "Get a contract",
    params(("id" = uuid::Uuid, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Contract", body = ContractResponse),
        (status = 404, description = "Contract not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<ContractId>,
    current_user: CurrentUser,
) -> Result<Json<ContractResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let contract = owned_contract(&mut conn, &current_user, id).await?;

    Ok(Json(ContractResponse::from(contract)))
}

#[utoipa::path(
    patch,
    path = "/contracts/{id}",
    tag = "contracts",
    summary = "Renegotiate a contract",
    request_body = ContractUpdate,
    params(("id" = uuid::Uuid, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Updated contract", body = ContractResponse),
        (status = 400, description = "Contract has ended"),
        (status = 404, description = "Contract or service not found"),
        (status = 422, description = "Invalid dates or thresholds"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_contract(
    State(state): State<AppState>,
    Path(id): Path<ContractId>,
    current_user: CurrentUser,
    Json(request): Json<ContractUpdate>,
) -> Result<Json<ContractResponse>> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = owned_contract(&mut conn, &current_user, id).await?;

    if existing.status.is_final() {
        return Err(Error::bad_request("Contract has ended and can no longer change"));
    }
    if let Some(end_date) = request.end_date
        && end_date <= existing.start_date
    {
        return Err(Error::validation("end_date", "end_date must be after start_date"));
    }
    if let Some(Some(service_id)) = request.service_id {
        let service = owned_service(&mut conn, &current_user, service_id).await?;
        if service.owner_id != existing.owner_id {
            return Err(Error::not_found("Service", service_id));
        }
    }

    let contract = Contracts::new(&mut conn)
        .update(
            id,
            &ContractUpdateDBRequest {
                service_id: request.service_id,
                client_name: request.client_name,
                monthly_value: request.monthly_value,
                guaranteed_uptime_percent: request.guaranteed_uptime_percent,
                max_latency_ms: request.max_latency_ms,
                min_throughput_mbps: request.min_throughput_mbps,
                penalty_rate_percent: request.penalty_rate_percent,
                end_date: request.end_date,
            },
        )
        .await?;

    Ok(Json(ContractResponse::from(contract)))
}

#[utoipa::path(
    delete,
    path = "/contracts/{id}",
    tag = "contracts",
    summary = "Delete a contract and its history",
    params(("id" = uuid::Uuid, Path, description = "Contract ID")),
    responses(
        (status = 204, description = "Contract deleted"),
        (status = 404, description = "Contract not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_contract(State(state): State<AppState>, Path(id): Path<ContractId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_contract(&mut conn, &current_user, id).await?;

    if Contracts::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Contract", id))
    }
}

#[utoipa::path(
    post,
    path = "/contracts/{id}/terminate",
    tag = "contracts",
    summary = "End a contract early",
    params(("id" = uuid::Uuid, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Terminated contract", body = ContractResponse),
        (status = 400, description = "Contract already expired"),
        (status = 404, description = "Contract not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn terminate_contract(
    State(state): State<AppState>,
    Path(id): Path<ContractId>,
    current_user: CurrentUser,
) -> Result<Json<ContractResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let contract = owned_contract(&mut conn, &current_user, id).await?;

    let contract = match contract.status {
        ContractStatus::Terminated => contract,
        ContractStatus::Expired => return Err(Error::bad_request("Contract has already expired")),
        ContractStatus::Active | ContractStatus::Breached => match Contracts::new(&mut conn).terminate(id).await? {
            Some(terminated) => terminated,
            // Ended between the read and the update
            None => match owned_contract(&mut conn, &current_user, id).await? {
                current if current.status == ContractStatus::Terminated => current,
                _ => return Err(Error::bad_request("Contract has already expired")),
            },
        },
    };

    Ok(Json(ContractResponse::from(contract)))
}

#[utoipa::path(
    get,
    path = "/contracts/{id}/compliance",
    tag = "contracts",
    summary = "Evaluate the contract against its service right now, without recording anything",
    params(("id" = uuid::Uuid, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Live SLA evaluation", body = ComplianceResponse),
        (status = 404, description = "Contract not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn contract_compliance(
    State(state): State<AppState>,
    Path(id): Path<ContractId>,
    current_user: CurrentUser,
) -> Result<Json<ComplianceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let contract = owned_contract(&mut conn, &current_user, id).await?;
    let service = match contract.service_id {
        Some(service_id) => Services::new(&mut conn).get_by_id(service_id).await?,
        None => None,
    };

    let now = Utc::now();
    let evaluation = sla::evaluate(&contract, service.as_ref(), now);

    Ok(Json(ComplianceResponse {
        contract_id: contract.id,
        service_id: contract.service_id,
        compliant: evaluation.violations.is_empty(),
        evaluated_at: now,
        evaluation,
    }))
}
