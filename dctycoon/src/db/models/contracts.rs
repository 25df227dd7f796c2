//! Database models for SLA contracts.

use crate::types::{ContractId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    #[default]
    Active,
    Breached,
    Expired,
    Terminated,
}

impl ContractStatus {
    /// Expired and terminated contracts are never evaluated again
    pub fn is_final(self) -> bool {
        matches!(self, ContractStatus::Expired | ContractStatus::Terminated)
    }
}

#[derive(Debug, Clone)]
pub struct ContractCreateDBRequest {
    pub owner_id: UserId,
    pub service_id: Option<ServiceId>,
    pub client_name: String,
    pub monthly_value: Decimal,
    pub guaranteed_uptime_percent: f64,
    pub max_latency_ms: f64,
    pub min_throughput_mbps: f64,
    pub penalty_rate_percent: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// `service_id: Some(None)` unlinks the contract from its service.
#[derive(Debug, Clone, Default)]
pub struct ContractUpdateDBRequest {
    pub service_id: Option<Option<ServiceId>>,
    pub client_name: Option<String>,
    pub monthly_value: Option<Decimal>,
    pub guaranteed_uptime_percent: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub min_throughput_mbps: Option<f64>,
    pub penalty_rate_percent: Option<Decimal>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Result of evaluating a contract, written back by the security tick
#[derive(Debug, Clone)]
pub struct ContractEvaluationDBRequest {
    pub status: ContractStatus,
    pub breach_count: i32,
    pub total_penalties: Decimal,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ContractDBResponse {
    pub id: ContractId,
    pub owner_id: UserId,
    pub service_id: Option<ServiceId>,
    pub client_name: String,
    pub monthly_value: Decimal,
    pub guaranteed_uptime_percent: f64,
    pub max_latency_ms: f64,
    pub min_throughput_mbps: f64,
    pub penalty_rate_percent: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ContractStatus,
    pub breach_count: i32,
    pub total_penalties: Decimal,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
