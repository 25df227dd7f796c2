use crate::api::handlers::datacenters::owned_datacenter;
use crate::api::models::devices::DeviceResponse;
use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::racks::{FreeSlotsQuery, FreeSlotsResponse, RackCreate, RackResponse, RackUpdate};
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::ensure_owner;
use crate::db::handlers::{Datacenters, Devices, Racks, Repository, devices::DeviceFilter, racks::RackFilter};
use crate::db::models::racks::{RackCreateDBRequest, RackDBResponse, RackUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::placement;
use crate::types::{DatacenterId, RackId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;
use validator::Validate;

/// Load a rack the caller may see, 404 otherwise
pub(crate) async fn owned_rack(conn: &mut PgConnection, user: &CurrentUser, id: RackId) -> Result<RackDBResponse> {
    let rack = Racks::new(conn).get_by_id(id).await?.ok_or_else(|| Error::not_found("Rack", id))?;
    ensure_owner(user, rack.owner_id, "Rack", id)?;

    Ok(rack)
}

#[utoipa::path(
    get,
    path = "/datacenter-management/datacenters/{id}/racks",
    tag = "racks",
    summary = "List racks in a datacenter",
    params(("id" = uuid::Uuid, Path, description = "Datacenter ID"), Pagination),
    responses(
        (status = 200, description = "Paginated list of racks", body = PaginatedResponse<RackResponse>),
        (status = 404, description = "Datacenter not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_racks(
    State(state): State<AppState>,
    Path(datacenter_id): Path<DatacenterId>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<RackResponse>>> {
    let (skip, limit) = pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_datacenter(&mut conn, &current_user, datacenter_id).await?;

    let filter = RackFilter::new(skip, limit).in_datacenter(datacenter_id);
    let mut repo = Racks::new(&mut conn);
    let racks = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        racks.into_iter().map(RackResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/datacenter-management/datacenters/{id}/racks",
    tag = "racks",
    summary = "Install a rack",
    request_body = RackCreate,
    params(("id" = uuid::Uuid, Path, description = "Datacenter ID")),
    responses(
        (status = 201, description = "Rack created", body = RackResponse),
        (status = 400, description = "Datacenter is at max_racks"),
        (status = 404, description = "Datacenter not found"),
        (status = 409, description = "Rack name already used in the datacenter"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_rack(
    State(state): State<AppState>,
    Path(datacenter_id): Path<DatacenterId>,
    current_user: CurrentUser,
    Json(request): Json<RackCreate>,
) -> Result<(StatusCode, Json<RackResponse>)> {
    request.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    owned_datacenter(&mut tx, &current_user, datacenter_id).await?;

    // Concurrent creates serialize on the datacenter row so max_racks holds
    Datacenters::new(&mut tx).lock(datacenter_id).await?;
    let datacenter = owned_datacenter(&mut tx, &current_user, datacenter_id).await?;
    if datacenter.rack_count >= i64::from(datacenter.max_racks) {
        return Err(Error::bad_request(format!(
            "Datacenter is full: {} of {} racks installed",
            datacenter.rack_count, datacenter.max_racks
        )));
    }

    let rack = Racks::new(&mut tx)
        .create(&RackCreateDBRequest {
            datacenter_id,
            name: request.name,
            total_units: request.total_units,
            max_power_kw: request.max_power_kw,
            status: request.status,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(RackResponse::from(rack))))
}

#[utoipa::path(
    get,
    path = "/datacenter-management/racks/{id}",
    tag = "racks",
    summary = "Get a rack",
    params(("id" = uuid::Uuid, Path, description = "Rack ID")),
    responses(
        (status = 200, description = "Rack with occupancy", body = RackResponse),
        (status = 404, description = "Rack not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_rack(State(state): State<AppState>, Path(id): Path<RackId>, current_user: CurrentUser) -> Result<Json<RackResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rack = owned_rack(&mut conn, &current_user, id).await?;

    Ok(Json(RackResponse::from(rack)))
}

#[utoipa::path(
    patch,
    path = "/datacenter-management/racks/{id}",
    tag = "racks",
    summary = "Update a rack",
    request_body = RackUpdate,
    params(("id" = uuid::Uuid, Path, description = "Rack ID")),
    responses(
        (status = 200, description = "Updated rack", body = RackResponse),
        (status = 400, description = "Rack would no longer fit its devices"),
        (status = 404, description = "Rack not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_rack(
    State(state): State<AppState>,
    Path(id): Path<RackId>,
    current_user: CurrentUser,
    Json(request): Json<RackUpdate>,
) -> Result<Json<RackResponse>> {
    request.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let existing = owned_rack(&mut tx, &current_user, id).await?;
    Racks::new(&mut tx).lock(id).await?;

    if let Some(total_units) = request.total_units {
        let highest = Racks::new(&mut tx)
            .occupants(id)
            .await?
            .iter()
            .map(|o| o.end_unit())
            .max()
            .unwrap_or(0);
        if highest > total_units.max(0) as u32 {
            return Err(Error::bad_request(format!(
                "Unit {highest} is occupied, the rack cannot shrink to {total_units} units"
            )));
        }
    }
    if let Some(max_power_kw) = request.max_power_kw {
        let used = Racks::new(&mut tx).power_used_kw(id, None).await?;
        if max_power_kw < used {
            return Err(Error::bad_request(format!(
                "Racked devices draw {used} kW, max power cannot be {max_power_kw} kW"
            )));
        }
    }

    let rack = Racks::new(&mut tx)
        .update(
            existing.id,
            &RackUpdateDBRequest {
                name: request.name,
                total_units: request.total_units,
                max_power_kw: request.max_power_kw,
                status: request.status,
            },
        )
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(RackResponse::from(rack)))
}

#[utoipa::path(
    delete,
    path = "/datacenter-management/racks/{id}",
    tag = "racks",
    summary = "Remove an empty rack",
    params(("id" = uuid::Uuid, Path, description = "Rack ID")),
    responses(
        (status = 204, description = "Rack deleted"),
        (status = 400, description = "Rack still holds devices"),
        (status = 404, description = "Rack not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_rack(State(state): State<AppState>, Path(id): Path<RackId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_rack(&mut conn, &current_user, id).await?;

    if Racks::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Rack", id))
    }
}

#[utoipa::path(
    get,
    path = "/datacenter-management/racks/{id}/devices",
    tag = "racks",
    summary = "Devices installed in a rack",
    params(("id" = uuid::Uuid, Path, description = "Rack ID"), Pagination),
    responses(
        (status = 200, description = "Paginated list of devices", body = PaginatedResponse<DeviceResponse>),
        (status = 404, description = "Rack not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_rack_devices(
    State(state): State<AppState>,
    Path(id): Path<RackId>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<DeviceResponse>>> {
    let (skip, limit) = pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_rack(&mut conn, &current_user, id).await?;

    let filter = DeviceFilter {
        rack_id: Some(id),
        ..DeviceFilter::new(skip, limit)
    };
    let mut repo = Devices::new(&mut conn);
    let devices = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        devices.into_iter().map(DeviceResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    get,
    path = "/datacenter-management/racks/{id}/free-slots",
    tag = "racks",
    summary = "Free unit ranges and the first fit for a block size",
    params(("id" = uuid::Uuid, Path, description = "Rack ID"), FreeSlotsQuery),
    responses(
        (status = 200, description = "Free space in the rack", body = FreeSlotsResponse),
        (status = 400, description = "Size must be at least 1"),
        (status = 404, description = "Rack not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn free_slots(
    State(state): State<AppState>,
    Path(id): Path<RackId>,
    Query(query): Query<FreeSlotsQuery>,
    current_user: CurrentUser,
) -> Result<Json<FreeSlotsResponse>> {
    let size = query.size.unwrap_or(1);
    if size == 0 {
        return Err(placement::PlacementError::ZeroSize.into());
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rack = owned_rack(&mut conn, &current_user, id).await?;
    let occupants = Racks::new(&mut conn).occupants(id).await?;
    let total_units = rack.total_units.max(0) as u32;

    Ok(Json(FreeSlotsResponse {
        size,
        first_fit: placement::find_free_slot(total_units, &occupants, size, None),
        free_ranges: placement::free_ranges(total_units, &occupants, None),
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::models::datacenters::DatacenterResponse;
    use crate::api::models::devices::DeviceResponse;
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::racks::RackResponse;
    use crate::test_utils::{auth_header_for, create_test_app, create_test_user};
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::json;
    use sqlx::PgPool;

    #[derive(Deserialize)]
    struct Range {
        start: u32,
        end: u32,
        units: u32,
    }

    #[derive(Deserialize)]
    struct Slots {
        size: u32,
        first_fit: Option<u32>,
        free_ranges: Vec<Range>,
    }

    async fn datacenter(server: &TestServer, auth: &(HeaderName, HeaderValue), max_racks: i32) -> DatacenterResponse {
        server
            .post("/api/datacenter-management/datacenters")
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({
                "name": "dc",
                "location": "Dublin",
                "tier": 2,
                "power_capacity_kw": 50.0,
                "cooling_capacity_kw": 50.0,
                "max_racks": max_racks
            }))
            .await
            .json()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rack_limit_and_listing(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, false).await;
        let auth = auth_header_for(&user);
        let dc = datacenter(&server, &auth, 1).await;
        let racks_path = format!("/api/datacenter-management/datacenters/{}/racks", dc.id);

        let response = server
            .post(&racks_path)
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"name": "a1", "max_power_kw": 8.0}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let rack: RackResponse = response.json();
        assert_eq!(rack.total_units, 42);
        assert_eq!(rack.free_units, 42);

        server
            .post(&racks_path)
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"name": "a2", "max_power_kw": 8.0}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let page: PaginatedResponse<RackResponse> = server.get(&racks_path).add_header(auth.0.clone(), auth.1.clone()).await.json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].id, rack.id);

        server
            .post(&racks_path)
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"name": "a3", "max_power_kw": 8.0, "total_units": 61}))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[sqlx::test]
    async fn test_free_slots_shrink_and_delete(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, false).await;
        let auth = auth_header_for(&user);
        let dc = datacenter(&server, &auth, 2).await;

        let rack: RackResponse = server
            .post(&format!("/api/datacenter-management/datacenters/{}/racks", dc.id))
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"name": "b1", "max_power_kw": 8.0, "total_units": 10}))
            .await
            .json();
        let device: DeviceResponse = server
            .post("/api/datacenter-management/devices")
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({
                "rack_id": rack.id,
                "start_unit": 3,
                "unit_size": 2,
                "name": "web-01",
                "device_type": "server",
                "power_draw_kw": 0.5
            }))
            .await
            .json();
        assert_eq!(device.end_unit, Some(4));

        let slots: Slots = server
            .get(&format!("/api/datacenter-management/racks/{}/free-slots?size=3", rack.id))
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .json();
        assert_eq!(slots.size, 3);
        assert_eq!(slots.first_fit, Some(5));
        let ranges: Vec<(u32, u32, u32)> = slots.free_ranges.iter().map(|r| (r.start, r.end, r.units)).collect();
        assert_eq!(ranges, vec![(1, 2, 2), (5, 10, 6)]);

        let devices: PaginatedResponse<DeviceResponse> = server
            .get(&format!("/api/datacenter-management/racks/{}/devices", rack.id))
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .json();
        assert_eq!(devices.total_count, 1);

        let rack_path = format!("/api/datacenter-management/racks/{}", rack.id);
        server
            .patch(&rack_path)
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"total_units": 3}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        let shrunk: RackResponse = server
            .patch(&rack_path)
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"total_units": 4}))
            .await
            .json();
        assert_eq!(shrunk.free_units, 2);

        let response = server.delete(&rack_path).add_header(auth.0.clone(), auth.1.clone()).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_text("Cannot delete rack with devices");

        server
            .delete(&format!("/api/datacenter-management/devices/{}", device.id))
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&rack_path)
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[sqlx::test]
    async fn test_racks_of_other_players_are_hidden(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, false).await;
        let stranger = create_test_user(&pool, false).await;
        let owner_auth = auth_header_for(&owner);
        let stranger_auth = auth_header_for(&stranger);
        let dc = datacenter(&server, &owner_auth, 2).await;

        server
            .post(&format!("/api/datacenter-management/datacenters/{}/racks", dc.id))
            .add_header(stranger_auth.0.clone(), stranger_auth.1.clone())
            .json(&json!({"name": "sneaky", "max_power_kw": 1.0}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
