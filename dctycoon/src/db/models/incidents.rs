//! Database models for incidents synthesized by the security tick.

use crate::types::{DatacenterId, IncidentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentSourceType {
    Firewall,
    LoadBalancer,
    Datacenter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Intrusion,
    Ddos,
    Overload,
    ServiceOutage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentCreateDBRequest {
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub source_type: IncidentSourceType,
    pub source_id: Uuid,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct IncidentDBResponse {
    pub id: IncidentId,
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub source_type: IncidentSourceType,
    pub source_id: Uuid,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub description: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
