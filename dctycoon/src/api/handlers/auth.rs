use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::Decimal;
use validator::Validate;

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, LoginRequest, RegisterRequest},
        users::{CurrentUser, UserResponse},
    },
    auth::{password, session},
    db::{
        handlers::{Repository, Users, Wallet},
        models::{
            users::UserCreateDBRequest,
            wallet::{TransactionType, WalletTransactionCreateDBRequest},
        },
    },
    errors::Error,
};

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

/// Register a new player account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "auth",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Registration disabled or invalid password"),
        (status = 409, description = "Username or email already taken"),
        (status = 422, description = "Invalid input"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<(StatusCode, Json<AuthResponse>), Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    request.validate()?;

    // Validate password length
    let password_config = &state.config.auth.password;
    let password_length = request.password.chars().count();
    if password_length < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if password_length > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }

    let password_hash = password::hash_password(request.password).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // Duplicate usernames and emails surface as unique violations (409)
    let created_user = Users::new(&mut tx)
        .create(&UserCreateDBRequest {
            username: request.username,
            email: request.email,
            password_hash: Some(password_hash),
            is_admin: false,
        })
        .await?;

    let initial_balance = state.config.wallet.initial_balance;
    if initial_balance > Decimal::ZERO {
        Wallet::new(&mut tx)
            .record(&WalletTransactionCreateDBRequest {
                user_id: created_user.id,
                transaction_type: TransactionType::InitialGrant,
                amount: initial_balance,
                description: Some("Starting capital".to_string()),
                reference_id: None,
            })
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let token = session::create_session_token(&CurrentUser::from(created_user.clone()), &state.config)?;
    Ok((StatusCode::CREATED, Json(AuthResponse::bearer(token, UserResponse::from(created_user)))))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or inactive account"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<AuthResponse>, Error> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let user = user_repo.get_user_by_email(&request.email).await?.ok_or_else(invalid_credentials)?;

    // Accounts without a password (e.g. the admin before one is configured) cannot log in
    let password_hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;
    if !password::verify_password(request.password, password_hash).await? {
        return Err(invalid_credentials());
    }

    if !user.is_active {
        return Err(Error::Unauthenticated {
            message: Some("Account is deactivated".to_string()),
        });
    }

    user_repo.record_login(user.id).await?;
    let user = user_repo.get_by_id(user.id).await?.unwrap_or(user);

    let token = session::create_session_token(&CurrentUser::from(user.clone()), &state.config)?;
    Ok(Json(AuthResponse::bearer(token, UserResponse::from(user))))
}

/// The authenticated player
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("AccessToken" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn me(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::not_found("User", current_user.id))?;

    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use crate::api::models::auth::AuthResponse;
    use crate::api::models::users::UserResponse;
    use crate::api::models::wallet::WalletResponse;
    use crate::test_utils::create_test_app;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_login_and_me(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;

        let response = server
            .post("/api/auth/register")
            .json(&json!({"username": "racker", "email": "racker@example.com", "password": "correct-horse"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let registered: AuthResponse = response.json();
        assert_eq!(registered.user.username, "racker");
        assert_eq!(registered.token_type, "bearer");

        // Starting capital is granted on registration
        let wallet: WalletResponse = server
            .get("/api/wallet")
            .add_header("access-token", registered.access_token.as_str())
            .await
            .json();
        assert_eq!(wallet.balance, Decimal::new(10_000, 0));

        let response = server
            .post("/api/auth/login")
            .json(&json!({"email": "RACKER@example.com", "password": "correct-horse"}))
            .await;
        response.assert_status_ok();
        let logged_in: AuthResponse = response.json();
        assert!(logged_in.user.last_login.is_some());

        let me: UserResponse = server
            .get("/api/auth/me")
            .add_header("authorization", format!("Bearer {}", logged_in.access_token))
            .await
            .json();
        assert_eq!(me.id, registered.user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_registration_conflicts(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let body = json!({"username": "racker", "email": "racker@example.com", "password": "correct-horse"});

        server.post("/api/auth/register").json(&body).await.assert_status(StatusCode::CREATED);
        server.post("/api/auth/register").json(&body).await.assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    async fn test_register_validation(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;

        server
            .post("/api/auth/register")
            .json(&json!({"username": "racker", "email": "not-an-email", "password": "correct-horse"}))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        server
            .post("/api/auth/register")
            .json(&json!({"username": "racker", "email": "racker@example.com", "password": "short"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn test_wrong_password_is_unauthorized(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        server
            .post("/api/auth/register")
            .json(&json!({"username": "racker", "email": "racker@example.com", "password": "correct-horse"}))
            .await
            .assert_status(StatusCode::CREATED);

        server
            .post("/api/auth/login")
            .json(&json!({"email": "racker@example.com", "password": "battery-staple"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .post("/api/auth/login")
            .json(&json!({"email": "nobody@example.com", "password": "battery-staple"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_protected_routes_need_a_token(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        server.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/datacenter-management/datacenters")
            .add_header("access-token", "not-a-jwt")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
