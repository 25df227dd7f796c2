//! API request/response models for the wallet.

use super::money::money_amount;
use crate::db::models::wallet::{TransactionType, WalletTransactionDBResponse};
use crate::types::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = f64)]
    pub balance: Decimal,
}

/// Deposit or withdrawal. The amount must be positive.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WalletMovement {
    #[validate(custom(function = "money_amount"))]
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    #[schema(value_type = i64)]
    pub id: TransactionId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    /// Always positive; `transaction_type` says which way it moved
    #[schema(value_type = f64)]
    pub amount: Decimal,
    #[schema(value_type = f64)]
    pub balance_after: Decimal,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransactionDBResponse> for TransactionResponse {
    fn from(db: WalletTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            transaction_type: db.transaction_type,
            amount: db.amount,
            balance_after: db.balance_after,
            description: db.description,
            reference_id: db.reference_id,
            created_at: db.created_at,
        }
    }
}
