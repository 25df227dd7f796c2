//! Database models for customer-facing services.

use crate::types::{DatacenterId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    WebHosting,
    Database,
    Storage,
    Compute,
    Cdn,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Running,
    Degraded,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServiceCreateDBRequest {
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub service_type: ServiceType,
    pub monthly_price: Decimal,
    pub uptime_percent: f64,
    pub avg_latency_ms: f64,
    pub throughput_mbps: f64,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceUpdateDBRequest {
    pub name: Option<String>,
    pub service_type: Option<ServiceType>,
    pub monthly_price: Option<Decimal>,
    pub uptime_percent: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub throughput_mbps: Option<f64>,
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceDBResponse {
    pub id: ServiceId,
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub service_type: ServiceType,
    pub monthly_price: Decimal,
    pub uptime_percent: f64,
    pub avg_latency_ms: f64,
    pub throughput_mbps: f64,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
