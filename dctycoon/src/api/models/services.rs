//! API request/response models for customer-facing services.

use super::money::price;
use super::pagination::Pagination;
use crate::db::models::services::{ServiceDBResponse, ServiceStatus, ServiceType};
use crate::types::{DatacenterId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

fn default_uptime() -> f64 {
    100.0
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ServiceCreate {
    #[schema(value_type = String, format = "uuid")]
    pub datacenter_id: DatacenterId,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub service_type: ServiceType,
    #[validate(custom(function = "price"))]
    #[schema(value_type = f64)]
    pub monthly_price: Decimal,
    #[serde(default = "default_uptime")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub uptime_percent: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub avg_latency_ms: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub throughput_mbps: f64,
    #[serde(default)]
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct ServiceUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub service_type: Option<ServiceType>,
    #[validate(custom(function = "price"))]
    #[schema(value_type = Option<f64>)]
    pub monthly_price: Option<Decimal>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub uptime_percent: Option<f64>,
    #[validate(range(min = 0.0))]
    pub avg_latency_ms: Option<f64>,
    #[validate(range(min = 0.0))]
    pub throughput_mbps: Option<f64>,
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListServicesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[param(value_type = Option<String>)]
    pub datacenter_id: Option<DatacenterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ServiceId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub service_type: ServiceType,
    #[schema(value_type = f64)]
    pub monthly_price: Decimal,
    pub uptime_percent: f64,
    pub avg_latency_ms: f64,
    pub throughput_mbps: f64,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ServiceDBResponse> for ServiceResponse {
    fn from(db: ServiceDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            datacenter_id: db.datacenter_id,
            name: db.name,
            service_type: db.service_type,
            monthly_price: db.monthly_price,
            uptime_percent: db.uptime_percent,
            avg_latency_ms: db.avg_latency_ms,
            throughput_mbps: db.throughput_mbps,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
