//! Database models for racks.

use crate::db::models::datacenters::FacilityStatus;
use crate::types::{DatacenterId, RackId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct RackCreateDBRequest {
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub total_units: i32,
    pub max_power_kw: f64,
    pub status: FacilityStatus,
}

#[derive(Debug, Clone, Default)]
pub struct RackUpdateDBRequest {
    pub name: Option<String>,
    pub total_units: Option<i32>,
    pub max_power_kw: Option<f64>,
    pub status: Option<FacilityStatus>,
}

/// Rack row with its owner (through the datacenter) and occupancy aggregates
#[derive(Debug, Clone, FromRow)]
pub struct RackDBResponse {
    pub id: RackId,
    pub datacenter_id: DatacenterId,
    pub owner_id: UserId,
    pub name: String,
    pub total_units: i32,
    pub max_power_kw: f64,
    pub status: FacilityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub device_count: i64,
    /// Units covered by racked devices
    pub used_units: i64,
    pub power_used_kw: f64,
}
