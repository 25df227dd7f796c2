//! SLA contract evaluation against service metrics.

use crate::db::models::{
    contracts::{ContractDBResponse, ContractStatus},
    services::ServiceDBResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

/// A guarantee the linked service currently fails
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum SlaViolation {
    Uptime { actual: f64, guaranteed: f64 },
    Latency { actual: f64, max: f64 },
    Throughput { actual: f64, min: f64 },
}

/// What an evaluation did to the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlaTransition {
    /// Nothing changed
    Unchanged,
    /// Past its end date
    Expired,
    /// Went from active to breached, a penalty is due
    Breached,
    /// Was breached and still is, no new charge
    StillBreached,
    /// Was breached, now meets every guarantee
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SlaEvaluation {
    pub status: ContractStatus,
    pub transition: SlaTransition,
    pub violations: Vec<SlaViolation>,
    pub breach_count: i32,
    /// Charged on this evaluation, zero unless the transition is `breached`
    #[schema(value_type = f64)]
    pub penalty: Decimal,
    #[schema(value_type = f64)]
    pub total_penalties: Decimal,
}

pub fn violations(contract: &ContractDBResponse, service: &ServiceDBResponse) -> Vec<SlaViolation> {
    let mut found = Vec::new();
    if service.uptime_percent < contract.guaranteed_uptime_percent {
        found.push(SlaViolation::Uptime {
            actual: service.uptime_percent,
            guaranteed: contract.guaranteed_uptime_percent,
        });
    }
    if service.avg_latency_ms > contract.max_latency_ms {
        found.push(SlaViolation::Latency {
            actual: service.avg_latency_ms,
            max: contract.max_latency_ms,
        });
    }
    if service.throughput_mbps < contract.min_throughput_mbps {
        found.push(SlaViolation::Throughput {
            actual: service.throughput_mbps,
            min: contract.min_throughput_mbps,
        });
    }
    found
}

/// `monthly_value * rate% * violations`, rounded to cents.
pub fn penalty_amount(contract: &ContractDBResponse, violation_count: usize) -> Decimal {
    (contract.monthly_value * contract.penalty_rate_percent / Decimal::ONE_HUNDRED * Decimal::from(violation_count as u64))
        .round_dp(2)
}

/// Evaluate a contract at `now`.
///
/// Contracts without a linked service only ever expire.
pub fn evaluate(contract: &ContractDBResponse, service: Option<&ServiceDBResponse>, now: DateTime<Utc>) -> SlaEvaluation {
    let violations = service.map(|s| violations(contract, s)).unwrap_or_default();

    let unchanged = |transition, violations| SlaEvaluation {
        status: contract.status,
        transition,
        violations,
        breach_count: contract.breach_count,
        penalty: Decimal::ZERO,
        total_penalties: contract.total_penalties,
    };

    if contract.status.is_final() {
        return unchanged(SlaTransition::Unchanged, violations);
    }

    if now > contract.end_date {
        return SlaEvaluation {
            status: ContractStatus::Expired,
            ..unchanged(SlaTransition::Expired, violations)
        };
    }

    match (contract.status, violations.is_empty()) {
        (ContractStatus::Active, false) => {
            let penalty = penalty_amount(contract, violations.len());
            SlaEvaluation {
                status: ContractStatus::Breached,
                transition: SlaTransition::Breached,
                breach_count: contract.breach_count + 1,
                penalty,
                total_penalties: contract.total_penalties + penalty,
                violations,
            }
        }
        (ContractStatus::Breached, false) => unchanged(SlaTransition::StillBreached, violations),
        (ContractStatus::Breached, true) => SlaEvaluation {
            status: ContractStatus::Active,
            ..unchanged(SlaTransition::Recovered, violations)
        },
        _ => unchanged(SlaTransition::Unchanged, violations),
    }
}
