use crate::api::models::datacenters::{DatacenterCreate, DatacenterResponse, DatacenterUpdate};
use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{Datacenters, Repository, datacenters::DatacenterFilter};
use crate::db::models::datacenters::{DatacenterCreateDBRequest, DatacenterDBResponse, DatacenterUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::DatacenterId;
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use validator::Validate;

/// Load a datacenter the caller may see, 404 otherwise
pub(crate) async fn owned_datacenter(conn: &mut PgConnection, user: &CurrentUser, id: DatacenterId) -> Result<DatacenterDBResponse> {
    let datacenter = Datacenters::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Datacenter", id))?;
    ensure_owner(user, datacenter.owner_id, "Datacenter", id)?;

    Ok(datacenter)
}

#[utoipa::path(
    get,
    path = "/datacenter-management/datacenters",
    tag = "datacenters",
    summary = "List datacenters",
    params(Pagination),
    responses(
        (status = 200, description = "Paginated list of datacenters", body = PaginatedResponse<DatacenterResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_datacenters(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<DatacenterResponse>>> {
    let (skip, limit) = pagination.params();
    let filter = DatacenterFilter::new(owner_scope(&current_user), skip, limit);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Datacenters::new(&mut conn);
    let datacenters = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        datacenters.into_iter().map(DatacenterResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/datacenter-management/datacenters",
    tag = "datacenters",
    summary = "Build a datacenter",
    request_body = DatacenterCreate,
    responses(
        (status = 201, description = "Datacenter created", body = DatacenterResponse),
        (status = 409, description = "Name already used by this player"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_datacenter(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<DatacenterCreate>,
) -> Result<(StatusCode, Json<DatacenterResponse>)> {
    request.validate()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let datacenter = Datacenters::new(&mut conn)
        .create(&DatacenterCreateDBRequest {
            owner_id: current_user.id,
            name: request.name,
            location: request.location,
            tier: request.tier,
            power_capacity_kw: request.power_capacity_kw,
            cooling_capacity_kw: request.cooling_capacity_kw,
            max_racks: request.max_racks,
            status: request.status,
            monthly_operating_cost: request.monthly_operating_cost,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DatacenterResponse::from(datacenter))))
}

#[utoipa::path(
    get,
    path = "/datacenter-management/datacenters/{id}",
    tag = "datacenters",
    summary = "Get a datacenter",
    params(("id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 200, description = "Datacenter with utilization", body = DatacenterResponse),
        (status = 404, description = "Datacenter not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_datacenter(
    State(state): State<AppState>,
    Path(id): Path<DatacenterId>,
    current_user: CurrentUser,
) -> Result<Json<DatacenterResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let datacenter = owned_datacenter(&mut conn, &current_user, id).await?;

    Ok(Json(DatacenterResponse::from(datacenter)))
}

#[utoipa::path(
    patch,
    path = "/datacenter-management/datacenters/{id}",
    tag = "datacenters",
    summary = "Update a datacenter",
    request_body = DatacenterUpdate,
    params(("id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 200, description = "Updated datacenter", body = DatacenterResponse),
        (status = 400, description = "New capacity below current usage"),
        (status = 404, description = "Datacenter not found"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_datacenter(
    State(state): State<AppState>,
    Path(id): Path<DatacenterId>,
    current_user: CurrentUser,
    Json(request): Json<DatacenterUpdate>,
) -> Result<Json<DatacenterResponse>> {
    request.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    owned_datacenter(&mut tx, &current_user, id).await?;

    // Capacity checks run under the same lock that rack and device placement take
    Datacenters::new(&mut tx).lock(id).await?;
    let existing = owned_datacenter(&mut tx, &current_user, id).await?;
    if let Some(max_racks) = request.max_racks
        && i64::from(max_racks) < existing.rack_count
    {
        return Err(Error::bad_request(format!(
            "Datacenter already holds {} racks, max_racks cannot be {max_racks}",
            existing.rack_count
        )));
    }
    if let Some(power_capacity_kw) = request.power_capacity_kw
        && power_capacity_kw < existing.power_used_kw
    {
        return Err(Error::bad_request(format!(
            "Racked devices draw {} kW, power capacity cannot be {power_capacity_kw} kW",
            existing.power_used_kw
        )));
    }

    let updated = Datacenters::new(&mut tx)
        .update(
            id,
            &DatacenterUpdateDBRequest {
                name: request.name,
                location: request.location,
                tier: request.tier,
                power_capacity_kw: request.power_capacity_kw,
                cooling_capacity_kw: request.cooling_capacity_kw,
                max_racks: request.max_racks,
                status: request.status,
                monthly_operating_cost: request.monthly_operating_cost,
            },
        )
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(DatacenterResponse::from(updated)))
}

#[utoipa::path(
    delete,
    path = "/datacenter-management/datacenters/{id}",
    tag = "datacenters",
    summary = "Demolish an empty datacenter",
    params(("id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 204, description = "Datacenter deleted"),
        (status = 400, description = "Datacenter still has racks"),
        (status = 404, description = "Datacenter not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_datacenter(
    State(state): State<AppState>,
    Path(id): Path<DatacenterId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_datacenter(&mut conn, &current_user, id).await?;

    if Datacenters::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Datacenter", id))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::models::datacenters::DatacenterResponse;
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::racks::RackResponse;
    use crate::test_utils::{auth_header_for, create_test_app, create_test_user};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    fn datacenter_body(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "location": "Frankfurt",
            "tier": 3,
            "power_capacity_kw": 100.0,
            "cooling_capacity_kw": 80.0,
            "max_racks": 4
        })
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_datacenter_lifecycle(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, false).await;
        let (name, value) = auth_header_for(&user);

        let response = server
            .post("/api/datacenter-management/datacenters")
            .add_header(name.clone(), value.clone())
            .json(&datacenter_body("fra-1"))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: DatacenterResponse = response.json();
        assert_eq!(created.owner_id, user.id);
        assert_eq!(created.rack_count, 0);
        assert_eq!(created.power_utilization_percent, 0.0);

        // Same name for the same owner conflicts
        server
            .post("/api/datacenter-management/datacenters")
            .add_header(name.clone(), value.clone())
            .json(&datacenter_body("fra-1"))
            .await
            .assert_status(StatusCode::CONFLICT);

        let updated: DatacenterResponse = server
            .patch(&format!("/api/datacenter-management/datacenters/{}", created.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"location": "Berlin", "status": "maintenance"}))
            .await
            .json();
        assert_eq!(updated.location, "Berlin");
        assert_eq!(updated.tier, 3);

        let page: PaginatedResponse<DatacenterResponse> = server
            .get("/api/datacenter-management/datacenters")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(page.total_count, 1);

        server
            .delete(&format!("/api/datacenter-management/datacenters/{}", created.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/datacenter-management/datacenters/{}", created.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    async fn test_delete_with_racks_and_shrinking_rejected(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, false).await;
        let (name, value) = auth_header_for(&user);

        let dc: DatacenterResponse = server
            .post("/api/datacenter-management/datacenters")
            .add_header(name.clone(), value.clone())
            .json(&datacenter_body("ams-1"))
            .await
            .json();
        for rack in ["r1", "r2"] {
            let _: RackResponse = server
                .post(&format!("/api/datacenter-management/datacenters/{}/racks", dc.id))
                .add_header(name.clone(), value.clone())
                .json(&json!({"name": rack, "max_power_kw": 10.0}))
                .await
                .json();
        }

        let response = server
            .delete(&format!("/api/datacenter-management/datacenters/{}", dc.id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_text("Cannot delete datacenter with racks");

        server
            .patch(&format!("/api/datacenter-management/datacenters/{}", dc.id))
            .add_header(name, value)
            .json(&json!({"max_racks": 1}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn test_other_players_datacenters_are_hidden(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, false).await;
        let stranger = create_test_user(&pool, false).await;
        let admin = create_test_user(&pool, true).await;
        let (owner_name, owner_value) = auth_header_for(&owner);
        let (stranger_name, stranger_value) = auth_header_for(&stranger);
        let (admin_name, admin_value) = auth_header_for(&admin);

        let dc: DatacenterResponse = server
            .post("/api/datacenter-management/datacenters")
            .add_header(owner_name, owner_value)
            .json(&datacenter_body("lon-1"))
            .await
            .json();
        let path = format!("/api/datacenter-management/datacenters/{}", dc.id);

        server
            .get(&path)
            .add_header(stranger_name.clone(), stranger_value.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .delete(&path)
            .add_header(stranger_name.clone(), stranger_value.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);
        let page: PaginatedResponse<DatacenterResponse> = server
            .get("/api/datacenter-management/datacenters")
            .add_header(stranger_name, stranger_value)
            .await
            .json();
        assert_eq!(page.total_count, 0);

        server.get(&path).add_header(admin_name, admin_value).await.assert_status_ok();
    }
}
