//! Database models for datacenters.

use crate::types::{DatacenterId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Operational state shared by datacenters and racks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FacilityStatus {
    #[default]
    Active,
    Maintenance,
    Offline,
}

#[derive(Debug, Clone)]
pub struct DatacenterCreateDBRequest {
    pub owner_id: UserId,
    pub name: String,
    pub location: String,
    pub tier: i16,
    pub power_capacity_kw: f64,
    pub cooling_capacity_kw: f64,
    pub max_racks: i32,
    pub status: FacilityStatus,
    pub monthly_operating_cost: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct DatacenterUpdateDBRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub tier: Option<i16>,
    pub power_capacity_kw: Option<f64>,
    pub cooling_capacity_kw: Option<f64>,
    pub max_racks: Option<i32>,
    pub status: Option<FacilityStatus>,
    pub monthly_operating_cost: Option<Decimal>,
}

/// Datacenter row plus the aggregates needed for utilization figures
#[derive(Debug, Clone, FromRow)]
pub struct DatacenterDBResponse {
    pub id: DatacenterId,
    pub owner_id: UserId,
    pub name: String,
    pub location: String,
    pub tier: i16,
    pub power_capacity_kw: f64,
    pub cooling_capacity_kw: f64,
    pub max_racks: i32,
    pub status: FacilityStatus,
    pub monthly_operating_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of racks in the datacenter
    pub rack_count: i64,
    /// Sum of power drawn by racked devices
    pub power_used_kw: f64,
}
