//! API request/response models for SLA contracts.

use super::pagination::Pagination;
use super::money::{percentage, price};
use crate::db::models::contracts::{ContractDBResponse, ContractStatus};
use crate::security::sla::SlaEvaluation;
use crate::types::{ContractId, ServiceId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

fn validate_dates(contract: &ContractCreate) -> Result<(), ValidationError> {
    let start = contract.start_date.unwrap_or_else(Utc::now);
    if contract.end_date <= start {
        return Err(ValidationError::new("dates").with_message("end_date must be after start_date".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_dates"))]
pub struct ContractCreate {
    /// Service the guarantees apply to. Without one only expiry is tracked.
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_id: Option<ServiceId>,
    #[validate(length(min = 1, max = 200))]
    pub client_name: String,
    #[validate(custom(function = "price"))]
    #[schema(value_type = f64)]
    pub monthly_value: Decimal,
    #[validate(range(min = 0.0, max = 100.0))]
    pub guaranteed_uptime_percent: f64,
    #[validate(range(min = 0.0))]
    pub max_latency_ms: f64,
    #[validate(range(min = 0.0))]
    pub min_throughput_mbps: f64,
    /// Percentage of `monthly_value` charged per violated guarantee
    #[validate(custom(function = "percentage"))]
    #[schema(value_type = f64)]
    pub penalty_rate_percent: Decimal,
    /// Defaults to now
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
}

/// Partial update. Send `"service_id": null` to unlink the service.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct ContractUpdate {
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_id: Option<Option<ServiceId>>,
    #[validate(length(min = 1, max = 200))]
    pub client_name: Option<String>,
    #[validate(custom(function = "price"))]
    #[schema(value_type = Option<f64>)]
    pub monthly_value: Option<Decimal>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub guaranteed_uptime_percent: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_latency_ms: Option<f64>,
    #[validate(range(min = 0.0))]
    pub min_throughput_mbps: Option<f64>,
    #[validate(custom(function = "percentage"))]
    #[schema(value_type = Option<f64>)]
    pub penalty_rate_percent: Option<Decimal>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListContractsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    #[param(value_type = Option<String>)]
    pub service_id: Option<ServiceId>,
    pub status: Option<ContractStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContractResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ContractId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_id: Option<ServiceId>,
    pub client_name: String,
    #[schema(value_type = f64)]
    pub monthly_value: Decimal,
    pub guaranteed_uptime_percent: f64,
    pub max_latency_ms: f64,
    pub min_throughput_mbps: f64,
    #[schema(value_type = f64)]
    pub penalty_rate_percent: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ContractStatus,
    pub breach_count: i32,
    #[schema(value_type = f64)]
    pub total_penalties: Decimal,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ContractDBResponse> for ContractResponse {
    fn from(db: ContractDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            service_id: db.service_id,
            client_name: db.client_name,
            monthly_value: db.monthly_value,
            guaranteed_uptime_percent: db.guaranteed_uptime_percent,
            max_latency_ms: db.max_latency_ms,
            min_throughput_mbps: db.min_throughput_mbps,
            penalty_rate_percent: db.penalty_rate_percent,
            start_date: db.start_date,
            end_date: db.end_date,
            status: db.status,
            breach_count: db.breach_count,
            total_penalties: db.total_penalties,
            last_evaluated_at: db.last_evaluated_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// What the next security tick would do to the contract, without doing it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComplianceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub contract_id: ContractId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub service_id: Option<ServiceId>,
    /// No violations against the linked service right now
    pub compliant: bool,
    pub evaluated_at: DateTime<Utc>,
    pub evaluation: SlaEvaluation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_end_date_must_follow_start() {
        let start = Utc::now();
        let contract = ContractCreate {
            service_id: None,
            client_name: "Initech".to_string(),
            monthly_value: Decimal::new(500, 0),
            guaranteed_uptime_percent: 99.9,
            max_latency_ms: 50.0,
            min_throughput_mbps: 100.0,
            penalty_rate_percent: Decimal::new(10, 0),
            start_date: Some(start),
            end_date: start - Duration::days(1),
        };
        assert!(contract.validate().is_err());

        let ok = ContractCreate {
            end_date: start + Duration::days(30),
            ..contract
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_rates_must_be_in_range() {
        let contract: ContractCreate = serde_json::from_value(serde_json::json!({
            "client_name": "Initech",
            "monthly_value": 500,
            "guaranteed_uptime_percent": 101.0,
            "max_latency_ms": 50.0,
            "min_throughput_mbps": 100.0,
            "penalty_rate_percent": -1,
            "end_date": Utc::now() + Duration::days(30)
        }))
        .unwrap();

        let errors = contract.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("guaranteed_uptime_percent"));
        assert!(fields.contains_key("penalty_rate_percent"));
    }

    #[test]
    fn test_money_must_fit_storage() {
        let contract: ContractCreate = serde_json::from_value(serde_json::json!({
            "client_name": "Initech",
            "monthly_value": 1_000_000_000_000_000i64,
            "guaranteed_uptime_percent": 99.0,
            "max_latency_ms": 50.0,
            "min_throughput_mbps": 100.0,
            "penalty_rate_percent": "12.345",
            "end_date": Utc::now() + Duration::days(30)
        }))
        .unwrap();

        let errors = contract.validate().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(fields["monthly_value"][0].code, "range");
        assert_eq!(fields["penalty_rate_percent"][0].code, "precision");

        let update = ContractUpdate {
            monthly_value: Some(Decimal::new(1, 3)),
            ..Default::default()
        };
        assert!(update.validate().unwrap_err().field_errors().contains_key("monthly_value"));
    }
}
