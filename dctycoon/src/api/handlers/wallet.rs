use crate::api::models::pagination::{PaginatedResponse, Pagination};
use crate::api::models::users::CurrentUser;
use crate::api::models::wallet::{TransactionResponse, WalletMovement, WalletResponse};
use crate::db::handlers::Wallet;
use crate::db::models::wallet::{TransactionType, WalletTransactionCreateDBRequest};
use crate::errors::{Error, Result};
use crate::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use validator::Validate;

#[utoipa::path(
    get,
    path = "/wallet",
    tag = "wallet",
    summary = "Current balance",
    responses(
        (status = 200, description = "Wallet balance", body = WalletResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_wallet(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<WalletResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let balance = Wallet::new(&mut conn).balance(current_user.id).await?;

    Ok(Json(WalletResponse {
        user_id: current_user.id,
        balance,
    }))
}

#[utoipa::path(
    get,
    path = "/wallet/transactions",
    tag = "wallet",
    summary = "Ledger entries, newest first",
    params(Pagination),
    responses(
        (status = 200, description = "Paginated ledger", body = PaginatedResponse<TransactionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<TransactionResponse>>> {
    let (skip, limit) = pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Wallet::new(&mut conn);

    let transactions = repo.list_transactions(current_user.id, skip, limit).await?;
    let total_count = repo.count_transactions(current_user.id).await?;

    Ok(Json(PaginatedResponse::new(
        transactions.into_iter().map(TransactionResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

async fn move_money(
    state: &AppState,
    current_user: &CurrentUser,
    transaction_type: TransactionType,
    request: WalletMovement,
) -> Result<(StatusCode, Json<TransactionResponse>)> {
    request.validate()?;
    if request.amount <= Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let transaction = Wallet::new(&mut conn)
        .record(&WalletTransactionCreateDBRequest {
            user_id: current_user.id,
            transaction_type,
            amount: request.amount,
            description: request.description,
            reference_id: None,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TransactionResponse::from(transaction))))
}

#[utoipa::path(
    post,
    path = "/wallet/deposit",
    tag = "wallet",
    summary = "Add money",
    request_body = WalletMovement,
    responses(
        (status = 201, description = "Ledger entry", body = TransactionResponse),
        (status = 400, description = "Amount not positive"),
        (status = 422, description = "Amount finer than a cent or too large"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn deposit(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<WalletMovement>,
) -> Result<(StatusCode, Json<TransactionResponse>)> {
    move_money(&state, &current_user, TransactionType::Deposit, request).await
}

#[utoipa::path(
    post,
    path = "/wallet/withdraw",
    tag = "wallet",
    summary = "Take money out",
    request_body = WalletMovement,
    responses(
        (status = 201, description = "Ledger entry", body = TransactionResponse),
        (status = 400, description = "Amount not positive or insufficient funds"),
        (status = 422, description = "Amount finer than a cent or too large"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn withdraw(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<WalletMovement>,
) -> Result<(StatusCode, Json<TransactionResponse>)> {
    move_money(&state, &current_user, TransactionType::Withdrawal, request).await
}
