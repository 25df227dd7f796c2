//! Database models for the wallet ledger.

use crate::types::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Ledger entry type stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Starting money granted on registration
    InitialGrant,
    Deposit,
    Withdrawal,
    /// Hardware bought for a rack
    Purchase,
    /// Charged by the security tick when a contract is breached
    SlaPenalty,
    Refund,
}

impl TransactionType {
    /// Whether the entry adds money to the wallet. Amounts are stored unsigned.
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            TransactionType::InitialGrant | TransactionType::Deposit | TransactionType::Refund
        )
    }

    /// Debits issued by the system may push the balance below zero, player debits may not.
    pub fn may_overdraw(self) -> bool {
        matches!(self, TransactionType::SlaPenalty)
    }

    /// Signed effect of `amount` on the balance
    pub fn signed(self, amount: Decimal) -> Decimal {
        if self.is_credit() { amount } else { -amount }
    }
}

/// Database request for appending a ledger entry
#[derive(Debug, Clone)]
pub struct WalletTransactionCreateDBRequest {
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    /// Always positive; the direction comes from `transaction_type`
    pub amount: Decimal,
    pub description: Option<String>,
    /// Entity the entry is about (device purchased, contract penalized)
    pub reference_id: Option<Uuid>,
}

/// Database response for a ledger entry
#[derive(Debug, Clone, FromRow)]
pub struct WalletTransactionDBResponse {
    pub id: TransactionId,
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_amounts() {
        let ten = Decimal::new(10, 0);
        assert_eq!(TransactionType::Deposit.signed(ten), ten);
        assert_eq!(TransactionType::InitialGrant.signed(ten), ten);
        assert_eq!(TransactionType::Purchase.signed(ten), -ten);
        assert_eq!(TransactionType::SlaPenalty.signed(ten), -ten);
    }

    #[test]
    fn test_only_penalties_overdraw() {
        assert!(TransactionType::SlaPenalty.may_overdraw());
        assert!(!TransactionType::Withdrawal.may_overdraw());
        assert!(!TransactionType::Purchase.may_overdraw());
    }
}
