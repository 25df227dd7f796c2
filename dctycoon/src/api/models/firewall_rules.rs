//! API request/response models for firewall rules.

use super::pagination::Pagination;
use crate::db::models::firewall_rules::{Direction, FirewallRuleDBResponse, Protocol, RuleAction};
use crate::types::{DatacenterId, FirewallRuleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// Literal accepted in place of a network for "any address"
pub const ANY_ADDRESS: &str = "any";

/// Accept `any`, a bare address, or `address/prefix` with a prefix valid for the address family.
///
/// A network must be written by its first address: `10.0.0.1/8` is refused, `10.0.0.0/8` is not.
pub fn validate_cidr(value: &str) -> Result<(), ValidationError> {
    if value.eq_ignore_ascii_case(ANY_ADDRESS) {
        return Ok(());
    }

    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };

    let invalid = || ValidationError::new("cidr").with_message(format!("'{value}' is not a valid CIDR network or 'any'").into());
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let max_prefix: u32 = if addr.is_ipv4() { 32 } else { 128 };

    if let Some(prefix) = prefix {
        let prefix: u32 = prefix.parse().map_err(|_| invalid())?;
        if prefix > max_prefix {
            return Err(invalid());
        }
        if has_host_bits(addr, prefix) {
            return Err(ValidationError::new("cidr")
                .with_message(format!("'{value}' has host bits set; use the network address").into()));
        }
    }

    Ok(())
}

fn has_host_bits(addr: IpAddr, prefix: u32) -> bool {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) & !u32::MAX.checked_shl(32 - prefix).unwrap_or(0) != 0,
        IpAddr::V6(v6) => u128::from(v6) & !u128::MAX.checked_shl(128 - prefix).unwrap_or(0) != 0,
    }
}

/// Ports come as a pair, only for TCP and UDP, within 1-65535 and in order.
pub fn check_ports(protocol: Protocol, start: Option<i32>, end: Option<i32>) -> Result<(), String> {
    match (start, end) {
        (None, None) => Ok(()),
        (Some(_), None) | (None, Some(_)) => Err("port_start and port_end must be given together".to_string()),
        (Some(_), Some(_)) if !protocol.has_ports() => Err("Ports can only be set for tcp or udp rules".to_string()),
        (Some(start), Some(end)) => {
            if !(1..=65535).contains(&start) || !(1..=65535).contains(&end) {
                Err("Ports must be between 1 and 65535".to_string())
            } else if start > end {
                Err("port_start must not exceed port_end".to_string())
            } else {
                Ok(())
            }
        }
    }
}

fn validate_create_ports(rule: &FirewallRuleCreate) -> Result<(), ValidationError> {
    check_ports(rule.protocol, rule.port_start, rule.port_end)
        .map_err(|message| ValidationError::new("ports").with_message(message.into()))
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_any() -> String {
    ANY_ADDRESS.to_string()
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create_ports"))]
pub struct FirewallRuleCreate {
    #[schema(value_type = String, format = "uuid")]
    pub datacenter_id: DatacenterId,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub action: RuleAction,
    pub direction: Direction,
    pub protocol: Protocol,
    #[serde(default = "default_any")]
    #[validate(custom(function = "validate_cidr"))]
    pub source_cidr: String,
    #[serde(default = "default_any")]
    #[validate(custom(function = "validate_cidr"))]
    pub destination_cidr: String,
    pub port_start: Option<i32>,
    pub port_end: Option<i32>,
    /// Lower runs first
    #[serde(default = "default_priority")]
    #[validate(range(min = 0, max = 10000))]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Partial update. Send `null` for both ports to drop the port restriction.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct FirewallRuleUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub action: Option<RuleAction>,
    pub direction: Option<Direction>,
    pub protocol: Option<Protocol>,
    #[validate(custom(function = "validate_cidr"))]
    pub source_cidr: Option<String>,
    #[validate(custom(function = "validate_cidr"))]
    pub destination_cidr: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<i32>)]
    pub port_start: Option<Option<i32>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<i32>)]
    pub port_end: Option<Option<i32>>,
    #[validate(range(min = 0, max = 10000))]
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

impl FirewallRuleUpdate {
    pub fn touches_ports(&self) -> bool {
        self.port_start.is_some() || self.port_end.is_some() || self.protocol.is_some()
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListFirewallRulesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[param(value_type = Option<String>)]
    pub datacenter_id: Option<DatacenterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FirewallRuleResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: FirewallRuleId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = String, format = "uuid")]
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

impl From<FirewallRuleDBResponse> for FirewallRuleResponse {
    fn from(db: FirewallRuleDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            datacenter_id: db.datacenter_id,
            name: db.name,
            action: db.action,
            direction: db.direction,
            protocol: db.protocol,
            source_cidr: db.source_cidr,
            destination_cidr: db.destination_cidr,
            port_start: db.port_start,
            port_end: db.port_end,
            priority: db.priority,
            enabled: db.enabled,
            hit_count: db.hit_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_validation() {
        for ok in ["any", "ANY", "10.0.0.0/8", "192.168.1.7", "0.0.0.0/0", "2001:db8::/32", "::1"] {
            assert!(validate_cidr(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["", "10.0.0.0/33", "2001:db8::/129", "10.0.0/8", "10.0.0.0/x", "anywhere", "10.0.0.0/8/1"] {
            assert!(validate_cidr(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_cidr_host_bits_rejected() {
        for ok in ["10.0.0.0/8", "10.1.0.0/16", "192.168.1.7/32", "192.168.1.6/31", "2001:db8::/32", "::1/128"] {
            assert!(validate_cidr(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["10.0.0.1/8", "192.168.1.7/24", "0.0.0.1/0", "2001:db8::1/32", "::1/0"] {
            let err = validate_cidr(bad).unwrap_err();
            assert!(err.message.unwrap().contains("host bits"), "{bad} should be rejected for host bits");
        }
    }

    #[test]
    fn test_port_rules() {
        assert!(check_ports(Protocol::Tcp, Some(80), Some(443)).is_ok());
        assert!(check_ports(Protocol::Icmp, None, None).is_ok());
        assert!(check_ports(Protocol::Udp, Some(53), None).is_err());
        assert!(check_ports(Protocol::Icmp, Some(1), Some(2)).is_err());
        assert!(check_ports(Protocol::Any, Some(1), Some(2)).is_err());
        assert!(check_ports(Protocol::Tcp, Some(0), Some(10)).is_err());
        assert!(check_ports(Protocol::Tcp, Some(100), Some(65536)).is_err());
        assert!(check_ports(Protocol::Tcp, Some(443), Some(80)).is_err());
    }

    #[test]
    fn test_create_defaults_and_schema_validation() {
        let rule: FirewallRuleCreate = serde_json::from_value(serde_json::json!({
            "datacenter_id": uuid::Uuid::new_v4(),
            "name": "ssh",
            "action": "allow",
            "direction": "inbound",
            "protocol": "icmp",
            "port_start": 22,
            "port_end": 22
        }))
        .unwrap();
        assert_eq!(rule.source_cidr, "any");
        assert_eq!(rule.priority, 100);
        assert!(rule.enabled);

        let errors = rule.validate().unwrap_err();
        assert!(errors.errors().contains_key("__all__"));
    }

    #[test]
    fn test_update_distinguishes_null_from_missing() {
        let clear: FirewallRuleUpdate = serde_json::from_value(serde_json::json!({"port_start": null, "port_end": null})).unwrap();
        assert_eq!(clear.port_start, Some(None));
        assert!(clear.touches_ports());

        let untouched: FirewallRuleUpdate = serde_json::from_value(serde_json::json!({"name": "web"})).unwrap();
        assert_eq!(untouched.port_start, None);
        assert!(!untouched.touches_ports());
    }
}
