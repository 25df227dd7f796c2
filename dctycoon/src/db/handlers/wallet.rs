//! Wallet ledger.
//!
//! The balance is the `balance_after` of a user's latest entry. Every append locks the user row
//! first, so concurrent writers for the same wallet queue up and each entry sees the balance left
//! by the previous one. "Latest" means highest `id`: ids are drawn under that lock, while
//! `created_at` of a long transaction can predate entries committed before it.

use crate::db::{
    errors::{DbError, Result},
    models::wallet::{WalletTransactionCreateDBRequest, WalletTransactionDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use rust_decimal::Decimal;
use sqlx::{Connection, PgConnection};
use tracing::instrument;

pub struct Wallet<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Wallet<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Current balance, zero for a user with no entries
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn balance(&mut self, user_id: UserId) -> Result<Decimal> {
        Self::current_balance(&mut *self.db, user_id).await
    }

    async fn current_balance(conn: &mut PgConnection, user_id: UserId) -> Result<Decimal> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT balance_after
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    /// Append a ledger entry and return it with the resulting balance.
    ///
    /// Debits that may not overdraw fail with [`DbError::InsufficientFunds`] and write nothing.
    #[instrument(
        skip(self, request),
        fields(user_id = %abbrev_uuid(&request.user_id), transaction_type = ?request.transaction_type, amount = %request.amount),
        err
    )]
    pub async fn record(&mut self, request: &WalletTransactionCreateDBRequest) -> Result<WalletTransactionDBResponse> {
        if request.amount <= Decimal::ZERO {
            return Err(DbError::Other(anyhow::anyhow!("ledger amounts must be positive, got {}", request.amount)));
        }

        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(request.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        let balance = Self::current_balance(&mut tx, request.user_id).await?;
        let balance_after = balance + request.transaction_type.signed(request.amount);

        if balance_after < Decimal::ZERO && !request.transaction_type.is_credit() && !request.transaction_type.may_overdraw() {
            return Err(DbError::InsufficientFunds {
                balance,
                requested: request.amount,
            });
        }

        let transaction = sqlx::query_as::<_, WalletTransactionDBResponse>(
            r#"
            INSERT INTO wallet_transactions (user_id, transaction_type, amount, balance_after, description, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(request.transaction_type)
        .bind(request.amount)
        .bind(balance_after)
        .bind(&request.description)
        .bind(request.reference_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(transaction)
    }

    /// A user's entries, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_transactions(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<WalletTransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, WalletTransactionDBResponse>(
            r#"
            SELECT *
            FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(transactions)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count_transactions(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM wallet_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}
