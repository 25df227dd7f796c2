//! API request/response models for load balancers.

use super::pagination::Pagination;
use crate::db::models::load_balancers::{Algorithm, LoadBalancerDBResponse, LoadBalancerStatus};
use crate::security::round2;
use crate::types::{DatacenterId, LoadBalancerId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// Backend and connection counts that must hold after any change
pub fn check_capacity(backend_count: i32, healthy_backends: i32) -> Result<(), String> {
    if healthy_backends > backend_count {
        return Err(format!(
            "healthy_backends ({healthy_backends}) cannot exceed backend_count ({backend_count})"
        ));
    }
    Ok(())
}

fn validate_create_capacity(lb: &LoadBalancerCreate) -> Result<(), ValidationError> {
    check_capacity(lb.backend_count, lb.healthy_backends)
        .map_err(|message| ValidationError::new("capacity").with_message(message.into()))
}

fn default_true() -> bool {
    true
}

fn default_health_check_interval() -> i32 {
    30
}

fn default_max_connections() -> i32 {
    10_000
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create_capacity"))]
pub struct LoadBalancerCreate {
    #[schema(value_type = String, format = "uuid")]
    pub datacenter_id: DatacenterId,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_true")]
    pub health_check_enabled: bool,
    #[serde(default = "default_health_check_interval")]
    #[validate(range(min = 1, max = 3600))]
    pub health_check_interval_seconds: i32,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default)]
    pub ddos_protection: bool,
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub current_connections: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub backend_count: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub healthy_backends: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct LoadBalancerUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub health_check_enabled: Option<bool>,
    #[validate(range(min = 1, max = 3600))]
    pub health_check_interval_seconds: Option<i32>,
    pub ssl_enabled: Option<bool>,
    pub ddos_protection: Option<bool>,
    #[validate(range(min = 1))]
    pub max_connections: Option<i32>,
    #[validate(range(min = 0))]
    pub backend_count: Option<i32>,
    #[validate(range(min = 0))]
    pub healthy_backends: Option<i32>,
}

/// Load report from the game client
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct TrafficUpdate {
    #[validate(range(min = 0))]
    pub current_connections: Option<i32>,
    #[validate(range(min = 0))]
    pub healthy_backends: Option<i32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListLoadBalancersQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[param(value_type = Option<String>)]
    pub datacenter_id: Option<DatacenterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoadBalancerResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: LoadBalancerId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = String, format = "uuid")]
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
    /// Status as of the last security tick
    pub status: LoadBalancerStatus,
    /// Current connections as a percentage of `max_connections`
    pub load_percent: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LoadBalancerDBResponse> for LoadBalancerResponse {
    fn from(db: LoadBalancerDBResponse) -> Self {
        Self {
            load_percent: round2(db.load_ratio() * 100.0),
            id: db.id,
            owner_id: db.owner_id,
            datacenter_id: db.datacenter_id,
            name: db.name,
            algorithm: db.algorithm,
            health_check_enabled: db.health_check_enabled,
            health_check_interval_seconds: db.health_check_interval_seconds,
            ssl_enabled: db.ssl_enabled,
            ddos_protection: db.ddos_protection,
            max_connections: db.max_connections,
            current_connections: db.current_connections,
            backend_count: db.backend_count,
            healthy_backends: db.healthy_backends,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_backends_bounded() {
        assert!(check_capacity(4, 4).is_ok());
        assert!(check_capacity(0, 0).is_ok());
        assert!(check_capacity(2, 3).is_err());

        let lb: LoadBalancerCreate = serde_json::from_value(serde_json::json!({
            "datacenter_id": uuid::Uuid::new_v4(),
            "name": "edge",
            "backend_count": 1,
            "healthy_backends": 2
        }))
        .unwrap();
        assert_eq!(lb.max_connections, 10_000);
        assert!(lb.validate().is_err());
    }

    #[test]
    fn test_traffic_rejects_negative_counts() {
        let traffic = TrafficUpdate {
            current_connections: Some(-1),
            healthy_backends: None,
        };
        assert!(traffic.validate().is_err());
    }
}
