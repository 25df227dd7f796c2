use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::security::{IncidentResponse, ListIncidentsQuery};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{Incidents, incidents::IncidentFilter};
use crate::errors::{Error, Result};
use crate::types::IncidentId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};

#[utoipa::path(
    get,
    path = "/incidents",
    tag = "security",
    summary = "List security incidents, newest first",
    params(ListIncidentsQuery),
    responses(
        (status = 200, description = "Paginated list of incidents", body = PaginatedResponse<IncidentResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<ListIncidentsQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<IncidentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = IncidentFilter {
        owner_id: owner_scope(&current_user),
        resolved: query.resolved,
        skip,
        limit,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Incidents::new(&mut conn);
    let incidents = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        incidents.into_iter().map(IncidentResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/incidents/{id}/resolve",
    tag = "security",
    summary = "Mark an incident resolved",
    params(("id" = uuid::Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Resolved incident", body = IncidentResponse),
        (status = 404, description = "Incident not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<IncidentId>,
    current_user: CurrentUser,
) -> Result<Json<IncidentResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Incidents::new(&mut conn);

    let incident = repo.get_by_id(id).await?.ok_or_else(|| Error::not_found("Incident", id))?;
    ensure_owner(&current_user, incident.owner_id, "Incident", id)?;
    let resolved = repo.resolve(id).await?;

    Ok(Json(IncidentResponse::from(resolved)))
}

#[cfg(test)]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::security::IncidentResponse;
    use crate::db::handlers::{Datacenters, Incidents, Repository, datacenters::tests::new_datacenter};
    use crate::db::models::incidents::{IncidentCreateDBRequest, IncidentKind, IncidentSourceType, Severity};
    use crate::test_utils::{auth_header_for, create_test_app, create_test_user};
    use axum::http::StatusCode;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filter_and_resolve(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, false).await;
        let stranger = create_test_user(&pool, false).await;
        let (name, value) = auth_header_for(&user);
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "inc-dc")).await.unwrap();

        let incident = Incidents::new(&mut conn)
            .create(&IncidentCreateDBRequest {
                owner_id: user.id,
                datacenter_id: dc.id,
                source_type: IncidentSourceType::Datacenter,
                source_id: dc.id,
                kind: IncidentKind::Intrusion,
                severity: Severity::High,
                description: "Datacenter 'inc-dc' has no active firewall rules".to_string(),
            })
            .await
            .unwrap()
            .unwrap();

        let open: PaginatedResponse<IncidentResponse> = server
            .get("/api/incidents?resolved=false")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(open.total_count, 1);
        assert_eq!(open.data[0].id, incident.id);

        let (stranger_name, stranger_value) = auth_header_for(&stranger);
        server
            .post(&format!("/api/incidents/{}/resolve", incident.id))
            .add_header(stranger_name, stranger_value)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let resolved: IncidentResponse = server
            .post(&format!("/api/incidents/{}/resolve", incident.id))
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());

        let open: PaginatedResponse<IncidentResponse> = server
            .get("/api/incidents?resolved=false")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(open.total_count, 0);
        let all: PaginatedResponse<IncidentResponse> = server.get("/api/incidents").add_header(name, value).await.json();
        assert_eq!(all.total_count, 1);
    }
}
