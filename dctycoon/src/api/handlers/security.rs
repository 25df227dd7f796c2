use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::security::{ListScoresQuery, SecurityOverview, SecurityScoreResponse};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::require_admin;
use crate::db::handlers::{FirewallRules, Incidents, LoadBalancers, SecurityScores, incidents::IncidentFilter};
use crate::errors::{Error, Result};
use crate::security::{SecurityTick, TickReport, scoring::compute_scores};
use crate::types::{Operation, Resource};
use crate::AppState;
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/security/overview",
    tag = "security",
    summary = "Live security scores and open incidents",
    responses(
        (status = 200, description = "Scores computed from the current configuration", body = SecurityOverview),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn security_overview(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<SecurityOverview>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let rules = FirewallRules::new(&mut conn).list_for_owner(current_user.id).await?;
    let balancers = LoadBalancers::new(&mut conn).list_for_owner(current_user.id).await?;
    let live = compute_scores(&rules, &balancers, &state.config.background_services.security_tick);

    let open_incidents = Incidents::new(&mut conn)
        .count(&IncidentFilter {
            owner_id: Some(current_user.id),
            resolved: Some(false),
            ..Default::default()
        })
        .await?;
    let latest_snapshot = SecurityScores::new(&mut conn).latest(current_user.id).await?;

    Ok(Json(SecurityOverview {
        live,
        open_incidents,
        latest_snapshot: latest_snapshot.map(SecurityScoreResponse::from),
    }))
}

#[utoipa::path(
    get,
    path = "/security/scores",
    tag = "security",
    summary = "Score snapshots stored by the security tick, newest first",
    params(ListScoresQuery),
    responses(
        (status = 200, description = "Paginated snapshot history", body = PaginatedResponse<SecurityScoreResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_scores(
    State(state): State<AppState>,
    Query(query): Query<ListScoresQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<SecurityScoreResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = SecurityScores::new(&mut conn);

    let scores = repo.list(current_user.id, skip, limit).await?;
    let total_count = repo.count(current_user.id).await?;

    Ok(Json(PaginatedResponse::new(
        scores.into_iter().map(SecurityScoreResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/admin/security/tick",
    tag = "admin",
    summary = "Run one security sweep now",
    responses(
        (status = 200, description = "What the sweep changed", body = TickReport),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn run_security_tick(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<TickReport>> {
    require_admin(&current_user, Operation::Run, Resource::SecurityTick)?;

    let tick = SecurityTick::new(state.db.clone(), state.config.background_services.security_tick.clone());
    let report = tick.run_once().await?;

    tracing::info!(admin = %current_user.id, users = report.users_processed, "Security tick triggered manually");
    Ok(Json(report))
}
