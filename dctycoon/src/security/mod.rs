//! Security simulation.
//!
//! The arithmetic lives in pure modules ([`scoring`], [`incidents`], [`sla`]) that operate on
//! loaded database records. [`tick::SecurityTick`] wires them to the database for one sweep over
//! all active players, and [`scheduler::SecurityTickScheduler`] repeats that sweep in the
//! background.

pub mod incidents;
pub mod scheduler;
pub mod scoring;
pub mod sla;
pub mod tick;

pub use scheduler::SecurityTickScheduler;
pub use tick::{SecurityTick, TickReport};

/// Round to two decimal places, the precision of every published score and percentage.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as a percentage, 0 when there is no capacity.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 { 0.0 } else { round2(part / whole * 100.0) }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Record builders for the pure simulation tests.

    use crate::db::models::{
        contracts::{ContractDBResponse, ContractStatus},
        firewall_rules::{Direction, FirewallRuleDBResponse, Protocol, RuleAction},
        load_balancers::{Algorithm, LoadBalancerDBResponse, LoadBalancerStatus},
        services::{ServiceDBResponse, ServiceStatus, ServiceType},
    };
    use crate::types::{DatacenterId, UserId};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub fn rule(action: RuleAction, direction: Direction, source: &str) -> FirewallRuleDBResponse {
        rule_in(Uuid::nil(), action, direction, source)
    }

    pub fn rule_in(datacenter_id: DatacenterId, action: RuleAction, direction: Direction, source: &str) -> FirewallRuleDBResponse {
        FirewallRuleDBResponse {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            datacenter_id,
            name: "rule".to_string(),
            action,
            direction,
            protocol: Protocol::Tcp,
            source_cidr: source.to_string(),
            destination_cidr: "any".to_string(),
            port_start: None,
            port_end: None,
            priority: 100,
            enabled: true,
            hit_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn balancer(backends: i32, healthy: i32, current: i32, max: i32) -> LoadBalancerDBResponse {
        LoadBalancerDBResponse {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            datacenter_id: Uuid::nil(),
            name: "lb".to_string(),
            algorithm: Algorithm::RoundRobin,
            health_check_enabled: true,
            health_check_interval_seconds: 30,
            ssl_enabled: true,
            ddos_protection: true,
            max_connections: max,
            current_connections: current,
            backend_count: backends,
            healthy_backends: healthy,
            status: LoadBalancerStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn service(datacenter_id: DatacenterId, uptime: f64) -> ServiceDBResponse {
        ServiceDBResponse {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            datacenter_id,
            name: "web".to_string(),
            service_type: ServiceType::WebHosting,
            monthly_price: Decimal::new(500, 0),
            uptime_percent: uptime,
            avg_latency_ms: 20.0,
            throughput_mbps: 1000.0,
            status: ServiceStatus::Running,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn contract(owner_id: UserId, status: ContractStatus) -> ContractDBResponse {
        let now = Utc::now();
        ContractDBResponse {
            id: Uuid::new_v4(),
            owner_id,
            service_id: Some(Uuid::new_v4()),
            client_name: "Initech".to_string(),
            monthly_value: Decimal::new(1000, 0),
            guaranteed_uptime_percent: 99.9,
            max_latency_ms: 50.0,
            min_throughput_mbps: 500.0,
            penalty_rate_percent: Decimal::new(10, 0),
            start_date: now - Duration::days(30),
            end_date: now + Duration::days(335),
            status,
            breach_count: 0,
            total_penalties: Decimal::ZERO,
            last_evaluated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(1.0, 3.0), 33.33);
        assert_eq!(percent_of(5.0, 0.0), 0.0);
        assert_eq!(percent_of(12.0, 10.0), 120.0);
    }
}
