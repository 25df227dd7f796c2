use crate::api::handlers::datacenters::owned_datacenter;
use crate::api::models::firewall_rules::{
    FirewallRuleCreate, FirewallRuleResponse, FirewallRuleUpdate, ListFirewallRulesQuery, check_ports,
};
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{FirewallRules, Repository, firewall_rules::FirewallRuleFilter};
use crate::db::models::firewall_rules::{FirewallRuleCreateDBRequest, FirewallRuleDBResponse, FirewallRuleUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::FirewallRuleId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use validator::Validate;

async fn owned_rule(conn: &mut PgConnection, user: &CurrentUser, id: FirewallRuleId) -> Result<FirewallRuleDBResponse> {
    let rule = FirewallRules::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Firewall rule", id))?;
    ensure_owner(user, rule.owner_id, "Firewall rule", id)?;

    Ok(rule)
}

#[utoipa::path(
    get,
    path = "/firewall-rules",
    tag = "firewall-rules",
    summary = "List firewall rules in evaluation order",
    params(ListFirewallRulesQuery),
    responses(
        (status = 200, description = "Paginated list of rules", body = PaginatedResponse<FirewallRuleResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<ListFirewallRulesQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<FirewallRuleResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = FirewallRuleFilter {
        owner_id: owner_scope(&current_user),
        datacenter_id: query.datacenter_id,
        skip,
        limit,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = FirewallRules::new(&mut conn);
    let rules = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        rules.into_iter().map(FirewallRuleResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/firewall-rules",
    tag = "firewall-rules",
    summary = "Create a firewall rule",
    request_body = FirewallRuleCreate,
    responses(
        (status = 201, description = "Rule created", body = FirewallRuleResponse),
        (status = 404, description = "Datacenter not found"),
        (status = 422, description = "Invalid CIDR or port range"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_rule(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<FirewallRuleCreate>,
) -> Result<(StatusCode, Json<FirewallRuleResponse>)> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let datacenter = owned_datacenter(&mut conn, &current_user, request.datacenter_id).await?;

    let rule = FirewallRules::new(&mut conn)
        .create(&FirewallRuleCreateDBRequest {
            owner_id: datacenter.owner_id,
            datacenter_id: datacenter.id,
            name: request.name,
            action: request.action,
            direction: request.direction,
            protocol: request.protocol,
            source_cidr: request.source_cidr,
            destination_cidr: request.destination_cidr,
            port_start: request.port_start,
            port_end: request.port_end,
            priority: request.priority,
            enabled: request.enabled,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(FirewallRuleResponse::from(rule))))
}

#[utoipa::path(
    get,
    path = "/firewall-rules/{id}",
    tag = "firewall-rules",
    summary = "Get a firewall rule",
    params(("id" = uuid::Uuid, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule", body = FirewallRuleResponse),
        (status = 404, description = "Rule not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<FirewallRuleId>,
    current_user: CurrentUser,
) -> Result<Json<FirewallRuleResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rule = owned_rule(&mut conn, &current_user, id).await?;

    Ok(Json(FirewallRuleResponse::from(rule)))
}

#[utoipa::path(
    patch,
    path = "/firewall-rules/{id}",
    tag = "firewall-rules",
    summary = "Update a firewall rule",
    request_body = FirewallRuleUpdate,
    params(("id" = uuid::Uuid, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Updated rule", body = FirewallRuleResponse),
        (status = 404, description = "Rule not found"),
        (status = 422, description = "Invalid CIDR or port range"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<FirewallRuleId>,
    current_user: CurrentUser,
    Json(request): Json<FirewallRuleUpdate>,
) -> Result<Json<FirewallRuleResponse>> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = owned_rule(&mut conn, &current_user, id).await?;

    // Ports are checked against the rule as it will look after the update
    let port_start = request.port_start.unwrap_or(existing.port_start);
    let port_end = request.port_end.unwrap_or(existing.port_end);
    if request.touches_ports() {
        check_ports(request.protocol.unwrap_or(existing.protocol), port_start, port_end)
            .map_err(|message| Error::validation("__all__", message))?;
    }
    let ports = (request.port_start.is_some() || request.port_end.is_some()).then(|| port_start.zip(port_end));

    let rule = FirewallRules::new(&mut conn)
        .update(
            id,
            &FirewallRuleUpdateDBRequest {
                name: request.name,
                action: request.action,
                direction: request.direction,
                protocol: request.protocol,
                source_cidr: request.source_cidr,
                destination_cidr: request.destination_cidr,
                ports,
                priority: request.priority,
                enabled: request.enabled,
            },
        )
        .await?;

    Ok(Json(FirewallRuleResponse::from(rule)))
}

#[utoipa::path(
    post,
    path = "/firewall-rules/{id}/toggle",
    tag = "firewall-rules",
    summary = "Enable a disabled rule or disable an enabled one",
    params(("id" = uuid::Uuid, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule with flipped enabled flag", body = FirewallRuleResponse),
        (status = 404, description = "Rule not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn toggle_rule(
    State(state): State<AppState>,
    Path(id): Path<FirewallRuleId>,
    current_user: CurrentUser,
) -> Result<Json<FirewallRuleResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_rule(&mut conn, &current_user, id).await?;
    let rule = FirewallRules::new(&mut conn).toggle(id).await?;

    Ok(Json(FirewallRuleResponse::from(rule)))
}

#[utoipa::path(
    delete,
    path = "/firewall-rules/{id}",
    tag = "firewall-rules",
    summary = "Delete a firewall rule",
    params(("id" = uuid::Uuid, Path, description = "Rule ID")),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Rule not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_rule(State(state): State<AppState>, Path(id): Path<FirewallRuleId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_rule(&mut conn, &current_user, id).await?;

    if FirewallRules::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Firewall rule", id))
    }
}
