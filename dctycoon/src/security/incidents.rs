//! Incident synthesis and its effect on services.
//!
//! Planning is deterministic: the same configuration always produces the same candidate
//! incidents, and a candidate is suppressed while an unresolved incident for the same source and
//! kind is still open.

use super::scoring::{is_default_deny, is_fully_open};
use crate::db::models::{
    datacenters::DatacenterDBResponse,
    firewall_rules::FirewallRuleDBResponse,
    incidents::{IncidentCreateDBRequest, IncidentKind, IncidentSourceType, Severity},
    load_balancers::{LoadBalancerDBResponse, LoadBalancerStatus},
    services::{ServiceDBResponse, ServiceStatus},
};
use crate::types::{DatacenterId, UserId};
use std::collections::HashSet;
use uuid::Uuid;

/// Uptime below this marks a running service as degraded
pub const DEGRADED_UPTIME_THRESHOLD: f64 = 99.0;

/// Above this load ratio an overload warning is raised even without saturation
const OVERLOAD_WARNING_RATIO: f64 = 0.9;

/// Uptime percentage points a new incident costs every service in its datacenter
pub fn severity_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.1,
        Severity::Medium => 0.5,
        Severity::High => 1.0,
        Severity::Critical => 2.5,
    }
}

/// Status implied by backend health and load.
pub fn derive_load_balancer_status(lb: &LoadBalancerDBResponse) -> LoadBalancerStatus {
    if lb.backend_count > 0 && lb.healthy_backends == 0 {
        LoadBalancerStatus::Down
    } else if lb.load_ratio() > 1.0 || lb.healthy_backends < lb.backend_count {
        LoadBalancerStatus::Degraded
    } else {
        LoadBalancerStatus::Active
    }
}

/// Loaded state of one player, as the planner sees it
pub struct PlanningInput<'a> {
    pub owner_id: UserId,
    pub datacenters: &'a [DatacenterDBResponse],
    pub rules: &'a [FirewallRuleDBResponse],
    pub load_balancers: &'a [LoadBalancerDBResponse],
    /// `(source_id, kind)` of every unresolved incident
    pub open: &'a HashSet<(Uuid, IncidentKind)>,
}

fn load_balancer_candidate(lb: &LoadBalancerDBResponse) -> Option<(IncidentKind, Severity, String)> {
    let load = lb.load_ratio();
    let load_percent = super::round2(load * 100.0);

    if derive_load_balancer_status(lb) == LoadBalancerStatus::Down {
        return Some((
            IncidentKind::ServiceOutage,
            Severity::Critical,
            format!("Load balancer '{}' has no healthy backends", lb.name),
        ));
    }
    if load > 1.0 {
        return Some(if lb.ddos_protection {
            (
                IncidentKind::Overload,
                Severity::Medium,
                format!("Load balancer '{}' is over capacity at {load_percent}%, DDoS protection is absorbing traffic", lb.name),
            )
        } else {
            (
                IncidentKind::Ddos,
                Severity::High,
                format!("Load balancer '{}' is flooded at {load_percent}% without DDoS protection", lb.name),
            )
        });
    }
    if load > OVERLOAD_WARNING_RATIO {
        return Some((
            IncidentKind::Overload,
            Severity::Low,
            format!("Load balancer '{}' is nearing capacity at {load_percent}%", lb.name),
        ));
    }
    None
}

fn datacenter_candidate(dc: &DatacenterDBResponse, rules: &[&FirewallRuleDBResponse]) -> Option<(Severity, String)> {
    if !rules.iter().any(|r| r.enabled) {
        return Some((Severity::High, format!("Datacenter '{}' has no active firewall rules", dc.name)));
    }
    if rules.iter().any(|r| is_fully_open(r)) {
        return Some(if rules.iter().any(|r| is_default_deny(r)) {
            (
                Severity::Medium,
                format!("Datacenter '{}' allows inbound traffic from any source on all ports", dc.name),
            )
        } else {
            (
                Severity::High,
                format!(
                    "Datacenter '{}' allows inbound traffic from any source on all ports and has no default deny",
                    dc.name
                ),
            )
        });
    }
    None
}

/// Incidents the current configuration warrants, minus those already open.
pub fn plan_incidents(input: &PlanningInput<'_>) -> Vec<IncidentCreateDBRequest> {
    let mut planned = Vec::new();
    let mut push = |datacenter_id: DatacenterId,
                    source_type: IncidentSourceType,
                    source_id: Uuid,
                    kind: IncidentKind,
                    severity: Severity,
                    description: String| {
        if !input.open.contains(&(source_id, kind)) {
            planned.push(IncidentCreateDBRequest {
                owner_id: input.owner_id,
                datacenter_id,
                source_type,
                source_id,
                kind,
                severity,
                description,
            });
        }
    };

    for lb in input.load_balancers {
        if let Some((kind, severity, description)) = load_balancer_candidate(lb) {
            push(lb.datacenter_id, IncidentSourceType::LoadBalancer, lb.id, kind, severity, description);
        }
    }

    for dc in input.datacenters {
        let rules: Vec<_> = input.rules.iter().filter(|r| r.datacenter_id == dc.id).collect();
        if let Some((severity, description)) = datacenter_candidate(dc, &rules) {
            push(dc.id, IncidentSourceType::Datacenter, dc.id, IncidentKind::Intrusion, severity, description);
        }
    }

    planned
}

/// Uptime and status a service should move to after this tick's incidents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceMetrics {
    pub uptime_percent: f64,
    pub status: ServiceStatus,
}

/// Apply new incident penalties, or recovery when the datacenter is quiet.
///
/// `datacenter_has_open_incident` covers both previously open and newly created incidents.
pub fn next_service_metrics(
    service: &ServiceDBResponse,
    new_incidents: &[IncidentCreateDBRequest],
    datacenter_has_open_incident: bool,
    recovery_per_tick: f64,
) -> ServiceMetrics {
    let penalty: f64 = new_incidents
        .iter()
        .filter(|i| i.datacenter_id == service.datacenter_id)
        .map(|i| severity_penalty(i.severity))
        .sum();

    let uptime = if penalty > 0.0 {
        service.uptime_percent - penalty
    } else if !datacenter_has_open_incident {
        service.uptime_percent + recovery_per_tick
    } else {
        service.uptime_percent
    };
    let uptime_percent = super::round2(uptime.clamp(0.0, 100.0));

    let status = match service.status {
        ServiceStatus::Stopped => ServiceStatus::Stopped,
        _ if uptime_percent < DEGRADED_UPTIME_THRESHOLD => ServiceStatus::Degraded,
        _ => ServiceStatus::Running,
    };

    ServiceMetrics { uptime_percent, status }
}
