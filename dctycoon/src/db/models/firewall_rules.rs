//! Database models for firewall rules.

use crate::types::{DatacenterId, FirewallRuleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Any,
}

impl Protocol {
    pub fn has_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

#[derive(Debug, Clone)]
pub struct FirewallRuleCreateDBRequest {
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub action: RuleAction,
    pub direction: Direction,
    pub protocol: Protocol,
    pub source_cidr: String,
    pub destination_cidr: String,
    pub port_start: Option<i32>,
    pub port_end: Option<i32>,
    pub priority: i32,
    pub enabled: bool,
}

/// Port updates replace both ends together, `Some(None)` clears the range.
#[derive(Debug, Clone, Default)]
pub struct FirewallRuleUpdateDBRequest {
    pub name: Option<String>,
    pub action: Option<RuleAction>,
    pub direction: Option<Direction>,
    pub protocol: Option<Protocol>,
    pub source_cidr: Option<String>,
    pub destination_cidr: Option<String>,
    pub ports: Option<Option<(i32, i32)>>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FirewallRuleDBResponse {
    pub id: FirewallRuleId,
    pub owner_id: UserId,
    pub datacenter_id: DatacenterId,
    pub name: String,
    pub action: RuleAction,
    pub direction: Direction,
    pub protocol: Protocol,
    pub source_cidr: String,
    pub destination_cidr: String,
    pub port_start: Option<i32>,
    pub port_end: Option<i32>,
    pub priority: i32,
    pub enabled: bool,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
