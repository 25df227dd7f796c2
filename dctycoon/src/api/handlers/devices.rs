//! Device inventory and rack placement.
//!
//! Every placement runs in one transaction that locks the device row (when it exists), then the
//! datacenter row and then the rack row, in that order, before reading occupancy and power usage. The checks and the write that follows
//! therefore see the same state even when two players' requests race.

use crate::api::handlers::racks::owned_rack;
use crate::api::models::devices::{DeviceCreate, DeviceMove, DeviceResponse, DeviceUpdate, ListDevicesQuery};
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::CurrentUser;
use crate::auth::permissions::{ensure_owner, owner_scope};
use crate::db::handlers::{Datacenters, Devices, Racks, Repository, Wallet, devices::DeviceFilter};
use crate::db::models::devices::{DeviceCreateDBRequest, DeviceDBResponse, DeviceUpdateDBRequest};
use crate::db::models::racks::RackDBResponse;
use crate::db::models::wallet::{TransactionType, WalletTransactionCreateDBRequest};
use crate::errors::{Error, Result};
use crate::placement::{self, PlacementError};
use crate::types::{DeviceId, RackId};
use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use validator::Validate;

/// Slack for floating point sums of power draw
const POWER_EPSILON_KW: f64 = 1e-9;

/// Lock the device and read it as it stands once the lock is held
async fn lock_device(conn: &mut PgConnection, user: &CurrentUser, id: DeviceId) -> Result<DeviceDBResponse> {
    Devices::new(conn).lock(id).await?;
    owned_device(conn, user, id).await
}

async fn owned_device(conn: &mut PgConnection, user: &CurrentUser, id: DeviceId) -> Result<DeviceDBResponse> {
    let device = Devices::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Device", id))?;
    ensure_owner(user, device.owner_id, "Device", id)?;

    Ok(device)
}

/// Lock the rack and its datacenter for the rest of the transaction
async fn lock_rack(conn: &mut PgConnection, user: &CurrentUser, rack_id: RackId) -> Result<RackDBResponse> {
    let rack = owned_rack(conn, user, rack_id).await?;
    Datacenters::new(conn).lock(rack.datacenter_id).await?;
    Racks::new(conn).lock(rack_id).await?;

    // Re-read so limits reflect any update that committed before the lock
    owned_rack(conn, user, rack_id).await
}

/// Fail unless `power_draw_kw` more fits under both the rack and the datacenter budget
async fn check_power(conn: &mut PgConnection, rack: &RackDBResponse, power_draw_kw: f64, exclude: Option<DeviceId>) -> Result<()> {
    let rack_used = Racks::new(conn).power_used_kw(rack.id, exclude).await?;
    if rack_used + power_draw_kw > rack.max_power_kw + POWER_EPSILON_KW {
        return Err(Error::bad_request(format!(
            "Rack power budget exceeded: {rack_used} kW in use, {power_draw_kw} kW requested, {} kW available",
            rack.max_power_kw
        )));
    }

    let datacenter = Datacenters::new(conn)
        .get_by_id(rack.datacenter_id)
        .await?
        .ok_or_else(|| Error::not_found("Datacenter", rack.datacenter_id))?;
    let datacenter_used = Datacenters::new(conn).power_used_kw(rack.datacenter_id, exclude).await?;
    if datacenter_used + power_draw_kw > datacenter.power_capacity_kw + POWER_EPSILON_KW {
        return Err(Error::bad_request(format!(
            "Datacenter power capacity exceeded: {datacenter_used} kW in use, {power_draw_kw} kW requested, {} kW available",
            datacenter.power_capacity_kw
        )));
    }

    Ok(())
}

/// Pick and validate the slot a device goes into. The rack must already be locked.
///
/// Without `start_unit` the device lands at the lowest free block that fits.
async fn reserve_slot(
    conn: &mut PgConnection,
    rack: &RackDBResponse,
    start_unit: Option<i32>,
    unit_size: i32,
    power_draw_kw: f64,
    exclude: Option<DeviceId>,
) -> Result<i32> {
    let occupants = Racks::new(conn).occupants(rack.id).await?;
    let total_units = rack.total_units.max(0) as u32;
    let size = unit_size.max(0) as u32;

    let start = match start_unit {
        Some(start) => {
            placement::validate_placement(total_units, &occupants, start.max(0) as u32, size, exclude)?;
            start
        }
        None => {
            let start = placement::find_free_slot(total_units, &occupants, size, exclude).ok_or(PlacementError::NoFreeSlot { size })?;
            start as i32
        }
    };

    check_power(conn, rack, power_draw_kw, exclude).await?;

    Ok(start)
}

fn require_rack_for_start_unit(rack_id: Option<RackId>, start_unit: Option<i32>) -> Result<()> {
    if rack_id.is_none() && start_unit.is_some() {
        return Err(Error::bad_request("start_unit requires rack_id"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/datacenter-management/devices",
    tag = "devices",
    summary = "List devices",
    params(ListDevicesQuery),
    responses(
        (status = 200, description = "Paginated list of devices", body = PaginatedResponse<DeviceResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<ListDevicesQuery>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<DeviceResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = DeviceFilter {
        owner_id: owner_scope(&current_user),
        rack_id: query.rack_id,
        unracked: query.unracked.unwrap_or(false),
        skip,
        limit,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Devices::new(&mut conn);
    let devices = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    let now = Utc::now();
    Ok(Json(PaginatedResponse::new(
        devices.into_iter().map(|d| DeviceResponse::at(d, now)).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/datacenter-management/devices",
    tag = "devices",
    summary = "Buy a device, optionally installing it in a rack",
    request_body = DeviceCreate,
    responses(
        (status = 201, description = "Device created", body = DeviceResponse),
        (status = 400, description = "Placement rejected or insufficient funds"),
        (status = 404, description = "Rack not found"),
        (status = 422, description = "Invalid input"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_device(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<DeviceCreate>,
) -> Result<(StatusCode, Json<DeviceResponse>)> {
    request.validate()?;
    require_rack_for_start_unit(request.rack_id, request.start_unit)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let start_unit = match request.rack_id {
        Some(rack_id) => {
            let rack = lock_rack(&mut tx, &current_user, rack_id).await?;
            Some(reserve_slot(&mut tx, &rack, request.start_unit, request.unit_size, request.power_draw_kw, None).await?)
        }
        None => None,
    };

    let device = Devices::new(&mut tx)
        .create(&DeviceCreateDBRequest {
            owner_id: current_user.id,
            rack_id: request.rack_id,
            start_unit,
            name: request.name,
            device_type: request.device_type,
            manufacturer: request.manufacturer,
            model: request.model,
            serial_number: request.serial_number,
            unit_size: request.unit_size,
            power_draw_kw: request.power_draw_kw,
            status: request.status,
            purchase_price: request.purchase_price,
            purchase_date: request.purchase_date.unwrap_or_else(Utc::now),
            warranty_months: request.warranty_months,
        })
        .await?;

    // Insufficient funds rolls the device back with the transaction
    if device.purchase_price > Decimal::ZERO {
        Wallet::new(&mut tx)
            .record(&WalletTransactionCreateDBRequest {
                user_id: current_user.id,
                transaction_type: TransactionType::Purchase,
                amount: device.purchase_price,
                description: Some(format!("Purchase of {}", device.name)),
                reference_id: Some(device.id),
            })
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(DeviceResponse::from(device))))
}

#[utoipa::path(
    get,
    path = "/datacenter-management/devices/{id}",
    tag = "devices",
    summary = "Get a device",
    params(("id" = uuid::Uuid, Path, description = "Device ID")),
    responses(
        (status = 200, description = "Device with warranty and age", body = DeviceResponse),
        (status = 404, description = "Device not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_device(State(state): State<AppState>, Path(id): Path<DeviceId>, current_user: CurrentUser) -> Result<Json<DeviceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let device = owned_device(&mut conn, &current_user, id).await?;

    Ok(Json(DeviceResponse::from(device)))
}

#[utoipa::path(
    patch,
    path = "/datacenter-management/devices/{id}",
    tag = "devices",
    summary = "Update a device",
    request_body = DeviceUpdate,
    params(("id" = uuid::Uuid, Path, description = "Device ID")),
    responses(
        (status = 200, description = "Updated device", body = DeviceResponse),
        (status = 400, description = "New power draw exceeds the rack or datacenter budget"),
        (status = 404, description = "Device not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    current_user: CurrentUser,
    Json(request): Json<DeviceUpdate>,
) -> Result<Json<DeviceResponse>> {
    request.validate()?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let existing = lock_device(&mut tx, &current_user, id).await?;

    if let (Some(power_draw_kw), Some(rack_id)) = (request.power_draw_kw, existing.rack_id)
        && power_draw_kw > existing.power_draw_kw
    {
        let rack = lock_rack(&mut tx, &current_user, rack_id).await?;
        check_power(&mut tx, &rack, power_draw_kw, Some(id)).await?;
    }

    let device = Devices::new(&mut tx)
        .update(
            id,
            &DeviceUpdateDBRequest {
                name: request.name,
                manufacturer: request.manufacturer,
                model: request.model,
                serial_number: request.serial_number,
                power_draw_kw: request.power_draw_kw,
                status: request.status,
                warranty_months: request.warranty_months,
            },
        )
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(DeviceResponse::from(device)))
}

#[utoipa::path(
    post,
    path = "/datacenter-management/devices/{id}/move",
    tag = "devices",
    summary = "Move a device to another slot, another rack or back to inventory",
    request_body = DeviceMove,
    params(("id" = uuid::Uuid, Path, description = "Device ID")),
    responses(
        (status = 200, description = "Device at its new position", body = DeviceResponse),
        (status = 400, description = "Placement rejected"),
        (status = 404, description = "Device or rack not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn move_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    current_user: CurrentUser,
    Json(request): Json<DeviceMove>,
) -> Result<Json<DeviceResponse>> {
    request.validate()?;
    require_rack_for_start_unit(request.rack_id, request.start_unit)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let device = lock_device(&mut tx, &current_user, id).await?;

    let placement = match request.rack_id {
        Some(rack_id) => {
            let rack = lock_rack(&mut tx, &current_user, rack_id).await?;
            let start = reserve_slot(&mut tx, &rack, request.start_unit, device.unit_size, device.power_draw_kw, Some(id)).await?;
            Some((rack_id, start))
        }
        None => None,
    };

    let moved = Devices::new(&mut tx).set_placement(id, placement).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::debug!(device_id = %id, rack_id = ?moved.rack_id, start_unit = ?moved.start_unit, "Device moved");
    Ok(Json(DeviceResponse::from(moved)))
}

#[utoipa::path(
    delete,
    path = "/datacenter-management/devices/{id}",
    tag = "devices",
    summary = "Scrap a device",
    params(("id" = uuid::Uuid, Path, description = "Device ID")),
    responses(
        (status = 204, description = "Device deleted"),
        (status = 404, description = "Device not found"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_device(State(state): State<AppState>, Path(id): Path<DeviceId>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_device(&mut conn, &current_user, id).await?;

    if Devices::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Device", id))
    }
}
