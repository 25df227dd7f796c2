//! API request/response models for racks.

use crate::db::models::{datacenters::FacilityStatus, racks::RackDBResponse};
use crate::placement::FreeRange;
use crate::security::percent_of;
use crate::types::{DatacenterId, RackId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

fn default_total_units() -> i32 {
    42
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RackCreate {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default = "default_total_units")]
    #[validate(range(min = 1, max = 60))]
    #[schema(default = 42)]
    pub total_units: i32,
    #[validate(range(min = 0.0))]
    pub max_power_kw: f64,
    #[serde(default)]
    pub status: FacilityStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct RackUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 60))]
    pub total_units: Option<i32>,
    #[validate(range(min = 0.0))]
    pub max_power_kw: Option<f64>,
    pub status: Option<FacilityStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RackResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: RackId,
    #[schema(value_type = String, format = "uuid")]
    pub datacenter_id: DatacenterId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub name: String,
    pub total_units: i32,
    pub max_power_kw: f64,
    pub status: FacilityStatus,
    pub device_count: i64,
    pub used_units: i64,
    pub free_units: i64,
    pub utilization_percent: f64,
    pub power_used_kw: f64,
    pub power_utilization_percent: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RackDBResponse> for RackResponse {
    fn from(db: RackDBResponse) -> Self {
        Self {
            free_units: (db.total_units as i64 - db.used_units).max(0),
            utilization_percent: percent_of(db.used_units as f64, db.total_units as f64),
            power_utilization_percent: percent_of(db.power_used_kw, db.max_power_kw),
            id: db.id,
            datacenter_id: db.datacenter_id,
            owner_id: db.owner_id,
            name: db.name,
            total_units: db.total_units,
            max_power_kw: db.max_power_kw,
            status: db.status,
            device_count: db.device_count,
            used_units: db.used_units,
            power_used_kw: db.power_used_kw,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, IntoParams)]
pub struct FreeSlotsQuery {
    /// Size of the block to look for, in units (default 1)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FreeSlotsResponse {
    pub size: u32,
    /// Lowest unit where a free block of `size` units starts
    pub first_fit: Option<u32>,
    pub free_ranges: Vec<FreeRange>,
}
