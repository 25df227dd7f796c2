//! Common type definitions and access-control vocabulary.
//!
//! # ID Types
//!
//! Entity IDs are UUIDs wrapped in type aliases so signatures say what they expect:
//!
//! - [`UserId`]: player account
//! - [`DatacenterId`], [`RackId`], [`DeviceId`]: physical infrastructure
//! - [`FirewallRuleId`], [`LoadBalancerId`]: network configuration
//! - [`ServiceId`], [`ContractId`]: customer-facing business entities
//! - [`IncidentId`]: synthesized security incidents
//!
//! Ledger rows and score snapshots use `BIGSERIAL` ids ([`TransactionId`], [`ScoreId`]) so
//! that insertion order is also id order.
//!
//! # Access Control
//!
//! Players own everything they create. Admins may read and modify everything and are the only
//! ones allowed to manage users or trigger a security sweep by hand. [`Resource`] and
//! [`Operation`] only exist to produce readable permission errors.

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type DatacenterId = Uuid;
pub type RackId = Uuid;
pub type DeviceId = Uuid;
pub type FirewallRuleId = Uuid;
pub type LoadBalancerId = Uuid;
pub type ServiceId = Uuid;
pub type ContractId = Uuid;
pub type IncidentId = Uuid;
pub type TransactionId = i64;
pub type ScoreId = i64;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    // Trigger a background job on demand
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Datacenters,
    Racks,
    Devices,
    FirewallRules,
    LoadBalancers,
    Services,
    Contracts,
    Wallet,
    Incidents,
    SecurityTick,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Run => write!(f, "run"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Datacenters => "datacenters",
            Resource::Racks => "racks",
            Resource::Devices => "devices",
            Resource::FirewallRules => "firewall rules",
            Resource::LoadBalancers => "load balancers",
            Resource::Services => "services",
            Resource::Contracts => "contracts",
            Resource::Wallet => "wallet",
            Resource::Incidents => "incidents",
            Resource::SecurityTick => "security tick",
        };
        write!(f, "{name}")
    }
}
