//! API response models for security scores and incidents.

use super::pagination::Pagination;
use crate::db::models::{
    incidents::{IncidentDBResponse, IncidentKind, IncidentSourceType, Severity},
    security_scores::SecurityScoreDBResponse,
};
use crate::security::scoring::SecurityScores;
use crate::types::{DatacenterId, IncidentId, ScoreId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecurityScoreResponse {
    #[schema(value_type = i64)]
    pub id: ScoreId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub firewall_score: f64,
    pub load_balancer_score: f64,
    pub overall_score: f64,
    pub open_incidents: i32,
    pub computed_at: DateTime<Utc>,
}

impl From<SecurityScoreDBResponse> for SecurityScoreResponse {
    fn from(db: SecurityScoreDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            firewall_score: db.firewall_score,
            load_balancer_score: db.load_balancer_score,
            overall_score: db.overall_score,
            open_incidents: db.open_incidents,
            computed_at: db.computed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SecurityOverview {
    /// Scores computed from the current rules and balancers
    pub live: SecurityScores,
    pub open_incidents: i64,
    /// Snapshot stored by the most recent security tick
    pub latest_snapshot: Option<SecurityScoreResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IncidentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: IncidentId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub datacenter_id: DatacenterId,
    pub source_type: IncidentSourceType,
    /// Firewall rule, load balancer or datacenter the incident was raised for
    #[schema(value_type = String, format = "uuid")]
    pub source_id: Uuid,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub description: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<IncidentDBResponse> for IncidentResponse {
    fn from(db: IncidentDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            datacenter_id: db.datacenter_id,
            source_type: db.source_type,
            source_id: db.source_id,
            kind: db.kind,
            severity: db.severity,
            description: db.description,
            resolved: db.resolved,
            created_at: db.created_at,
            resolved_at: db.resolved_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListIncidentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    /// Filter by resolution state, all incidents when omitted
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub resolved: Option<bool>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListScoresQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}
