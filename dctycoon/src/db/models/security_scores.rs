//! Database models for security score snapshots.

use crate::types::{ScoreId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct SecurityScoreCreateDBRequest {
    pub user_id: UserId,
    pub firewall_score: f64,
    pub load_balancer_score: f64,
    pub overall_score: f64,
    pub open_incidents: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct SecurityScoreDBResponse {
    pub id: ScoreId,
    pub user_id: UserId,
    pub firewall_score: f64,
    pub load_balancer_score: f64,
    pub overall_score: f64,
    pub open_incidents: i32,
    pub computed_at: DateTime<Utc>,
}
