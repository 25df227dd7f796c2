//! API request/response models for datacenters.

use super::money::money_amount;
use crate::db::models::datacenters::{DatacenterDBResponse, FacilityStatus};
use crate::security::percent_of;
use crate::types::{DatacenterId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DatacenterCreate {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    /// Uptime Institute tier, 1 to 4
    #[validate(range(min = 1, max = 4))]
    pub tier: i16,
    #[validate(range(min = 0.0))]
    pub power_capacity_kw: f64,
    #[validate(range(min = 0.0))]
    pub cooling_capacity_kw: f64,
    #[validate(range(min = 1))]
    pub max_racks: i32,
    #[serde(default)]
    pub status: FacilityStatus,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    #[schema(value_type = f64)]
    pub monthly_operating_cost: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct DatacenterUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub location: Option<String>,
    #[validate(range(min = 1, max = 4))]
    pub tier: Option<i16>,
    #[validate(range(min = 0.0))]
    pub power_capacity_kw: Option<f64>,
    #[validate(range(min = 0.0))]
    pub cooling_capacity_kw: Option<f64>,
    #[validate(range(min = 1))]
    pub max_racks: Option<i32>,
    pub status: Option<FacilityStatus>,
    #[validate(custom(function = "money_amount"))]
    #[schema(value_type = Option<f64>)]
    pub monthly_operating_cost: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatacenterResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DatacenterId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub name: String,
    pub location: String,
    pub tier: i16,
    pub power_capacity_kw: f64,
    pub cooling_capacity_kw: f64,
    pub max_racks: i32,
    pub status: FacilityStatus,
    #[schema(value_type = f64)]
    pub monthly_operating_cost: Decimal,
    pub rack_count: i64,
    pub power_used_kw: f64,
    pub power_utilization_percent: f64,
    /// Every kilowatt drawn has to be cooled away
    pub cooling_utilization_percent: f64,
    pub rack_utilization_percent: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DatacenterDBResponse> for DatacenterResponse {
    fn from(db: DatacenterDBResponse) -> Self {
        Self {
            power_utilization_percent: percent_of(db.power_used_kw, db.power_capacity_kw),
            cooling_utilization_percent: percent_of(db.power_used_kw, db.cooling_capacity_kw),
            rack_utilization_percent: percent_of(db.rack_count as f64, db.max_racks as f64),
            id: db.id,
            owner_id: db.owner_id,
            name: db.name,
            location: db.location,
            tier: db.tier,
            power_capacity_kw: db.power_capacity_kw,
            cooling_capacity_kw: db.cooling_capacity_kw,
            max_racks: db.max_racks,
            status: db.status,
            monthly_operating_cost: db.monthly_operating_cost,
            rack_count: db.rack_count,
            power_used_kw: db.power_used_kw,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
