//! Database models for load balancers.

use crate::types::{DatacenterId, LoadBalancerId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    IpHash,
    Weighted,
}

/// Derived by the security tick from backend health and load
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerStatus {
    #[default]
    Active,
    Degraded,
    Down,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerCreateDBRequest {
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub algorithm: Algorithm,
    pub health_check_enabled: bool,
    pub health_check_interval_seconds: i32,
    pub ssl_enabled: bool,
    pub ddos_protection: bool,
    pub max_connections: i32,
    pub current_connections: i32,
    pub backend_count: i32,
    pub healthy_backends: i32,
}

#[derive(Debug, Clone, Default)]
pub struct LoadBalancerUpdateDBRequest {
    pub name: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub health_check_enabled: Option<bool>,
    pub health_check_interval_seconds: Option<i32>,
    pub ssl_enabled: Option<bool>,
    pub ddos_protection: Option<bool>,
    pub max_connections: Option<i32>,
    pub current_connections: Option<i32>,
    pub backend_count: Option<i32>,
    pub healthy_backends: Option<i32>,
    pub status: Option<LoadBalancerStatus>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LoadBalancerDBResponse {
    pub id: LoadBalancerId,
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub algorithm: Algorithm,
    pub health_check_enabled: bool,
    pub health_check_interval_seconds: i32,
    pub ssl_enabled: bool,
    pub ddos_protection: bool,
    pub max_connections: i32,
    pub current_connections: i32,
    pub backend_count: i32,
    pub healthy_backends: i32,
    pub status: LoadBalancerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoadBalancerDBResponse {
    /// Current connections as a fraction of capacity (1.0 = full)
    pub fn load_ratio(&self) -> f64 {
        if self.max_connections <= 0 {
            return 0.0;
        }
        f64::from(self.current_connections) / f64::from(self.max_connections)
    }
}
