//! Security scores derived from firewall and load-balancer configuration.
//!
//! All scores are on a 0-100 scale and rounded to two decimals.

use super::round2;
use crate::config::SecurityTickConfig;
use crate::db::models::{
    firewall_rules::{Direction, FirewallRuleDBResponse, Protocol, RuleAction},
    load_balancers::LoadBalancerDBResponse,
};
use serde::Serialize;
use utoipa::ToSchema;

const DEFAULT_DENY_POINTS: f64 = 30.0;
const NO_OPEN_ALLOW_POINTS: f64 = 25.0;
const SPECIFIC_ALLOW_POINTS: f64 = 25.0;
const ENABLED_RATIO_POINTS: f64 = 20.0;

const HEALTH_CHECK_POINTS: f64 = 25.0;
const SSL_POINTS: f64 = 20.0;
const DDOS_POINTS: f64 = 25.0;
const HEALTHY_BACKEND_POINTS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct SecurityScores {
    pub firewall_score: f64,
    pub load_balancer_score: f64,
    pub overall_score: f64,
}

fn is_any(cidr: &str) -> bool {
    cidr.eq_ignore_ascii_case("any")
}

fn restricts_ports(rule: &FirewallRuleDBResponse) -> bool {
    rule.protocol != Protocol::Any && rule.port_start.is_some()
}

fn is_inbound(rule: &FirewallRuleDBResponse, action: RuleAction) -> bool {
    rule.enabled && rule.direction == Direction::Inbound && rule.action == action
}

/// An enabled inbound deny rule matching every source.
pub fn is_default_deny(rule: &FirewallRuleDBResponse) -> bool {
    is_inbound(rule, RuleAction::Deny) && is_any(&rule.source_cidr)
}

/// An enabled inbound allow rule matching every source on every port.
pub fn is_fully_open(rule: &FirewallRuleDBResponse) -> bool {
    is_inbound(rule, RuleAction::Allow) && is_any(&rule.source_cidr) && !restricts_ports(rule)
}

fn is_specific(rule: &FirewallRuleDBResponse) -> bool {
    !is_any(&rule.source_cidr) || restricts_ports(rule)
}

pub fn firewall_score(rules: &[FirewallRuleDBResponse]) -> f64 {
    if rules.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    if rules.iter().any(is_default_deny) {
        score += DEFAULT_DENY_POINTS;
    }
    if !rules.iter().any(is_fully_open) {
        score += NO_OPEN_ALLOW_POINTS;
    }

    let allows: Vec<_> = rules.iter().filter(|r| r.enabled && r.action == RuleAction::Allow).collect();
    if allows.is_empty() {
        score += SPECIFIC_ALLOW_POINTS;
    } else {
        let specific = allows.iter().filter(|r| is_specific(r)).count();
        score += SPECIFIC_ALLOW_POINTS * specific as f64 / allows.len() as f64;
    }

    let enabled = rules.iter().filter(|r| r.enabled).count();
    score += ENABLED_RATIO_POINTS * enabled as f64 / rules.len() as f64;

    round2(score)
}

fn headroom_points(load_ratio: f64) -> f64 {
    if load_ratio <= 0.8 {
        10.0
    } else if load_ratio <= 1.0 {
        5.0
    } else {
        0.0
    }
}

/// Score of a single balancer, unrounded.
fn balancer_points(lb: &LoadBalancerDBResponse) -> f64 {
    let mut points = 0.0;
    if lb.health_check_enabled {
        points += HEALTH_CHECK_POINTS;
    }
    if lb.ssl_enabled {
        points += SSL_POINTS;
    }
    if lb.ddos_protection {
        points += DDOS_POINTS;
    }
    if lb.backend_count > 0 {
        points += HEALTHY_BACKEND_POINTS * f64::from(lb.healthy_backends.min(lb.backend_count)) / f64::from(lb.backend_count);
    }
    points + headroom_points(lb.load_ratio())
}

pub fn load_balancer_score(balancers: &[LoadBalancerDBResponse]) -> f64 {
    if balancers.is_empty() {
        return 0.0;
    }
    let total: f64 = balancers.iter().map(balancer_points).sum();
    round2(total / balancers.len() as f64)
}

/// Combine rule and balancer state into the published scores.
///
/// Players without load balancers are judged on their firewall alone.
pub fn compute_scores(
    rules: &[FirewallRuleDBResponse],
    balancers: &[LoadBalancerDBResponse],
    config: &SecurityTickConfig,
) -> SecurityScores {
    let firewall_score = firewall_score(rules);
    let load_balancer_score = load_balancer_score(balancers);
    let overall_score = if balancers.is_empty() {
        firewall_score
    } else {
        round2(config.firewall_weight * firewall_score + config.load_balancer_weight * load_balancer_score)
    };

    SecurityScores {
        firewall_score,
        load_balancer_score,
        overall_score,
    }
}
