//! Test utilities shared by the unit and API tests.

use crate::{
    api::models::users::CurrentUser,
    auth::{current_user::ACCESS_TOKEN_HEADER, session},
    config::{BackgroundServicesConfig, Config, PoolSettings, SecurityTickConfig},
    db::{
        handlers::{Repository, Users, Wallet},
        models::{
            users::{UserCreateDBRequest, UserDBResponse},
            wallet::{TransactionType, WalletTransactionCreateDBRequest},
        },
    },
};
use axum_test::TestServer;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create_test_app(pool: PgPool) -> (TestServer, crate::BackgroundServices) {
    let config = create_test_config();

    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

pub fn create_test_config() -> Config {
    Config {
        database: crate::config::DatabaseConfig {
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
            // Will get overriden by the sqlx test pool
            url: "Something".to_string(),
        },
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        enable_metrics: false,
        background_services: BackgroundServicesConfig {
            security_tick: SecurityTickConfig {
                enabled: false,
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

pub async fn create_test_user(pool: &PgPool, is_admin: bool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let user_id = Uuid::new_v4();
    let username = format!("testuser_{}", user_id.simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username,
        email,
        password_hash: None,
        is_admin,
    };

    users_repo.create(&user_create).await.expect("Failed to create test user")
}

/// Put money in a test user's wallet
pub async fn fund_test_user(pool: &PgPool, user_id: Uuid, amount: i64) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Wallet::new(&mut conn)
        .record(&WalletTransactionCreateDBRequest {
            user_id,
            transaction_type: TransactionType::Deposit,
            amount: Decimal::new(amount, 0),
            description: Some("test funding".to_string()),
            reference_id: None,
        })
        .await
        .expect("Failed to fund test user");
}

/// `access-token` header carrying a freshly signed token for `user`
pub fn auth_header_for(user: &UserDBResponse) -> (axum::http::HeaderName, axum::http::HeaderValue) {
    let token = session::create_session_token(&CurrentUser::from(user.clone()), &create_test_config()).expect("Failed to sign token");
    (
        axum::http::HeaderName::from_static(ACCESS_TOKEN_HEADER),
        axum::http::HeaderValue::from_str(&token).expect("token is a valid header value"),
    )
}
