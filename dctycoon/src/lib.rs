//! # dctycoon: backend for a datacenter tycoon game
//!
//! Players build up a hosting business: they buy datacenters, fill them with racks and devices,
//! configure firewall rules and load balancers, run services and sell SLA contracts against those
//! services. A background security tick periodically inspects every player's configuration, raises
//! incidents, degrades or recovers service uptime, charges SLA penalties and stores a security
//! score snapshot.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses PostgreSQL for all persistence.
//!
//! The **API layer** ([`api`]) exposes a REST/JSON surface under `/api`. Handlers authenticate via
//! the [`CurrentUser`](api::models::users::CurrentUser) extractor, validate input and delegate to
//! the repositories in [`db`].
//!
//! The **placement engine** ([`placement`]) and the **security simulation** ([`security`]) are
//! pure functions over loaded records. Handlers and the tick load state, call them, and persist
//! the outcome inside one transaction.
//!
//! **Background services** currently consist of the
//! [`SecurityTickScheduler`](security::SecurityTickScheduler), which runs
//! [`SecurityTick::run_once`](security::SecurityTick::run_once) on a fixed interval until shutdown.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use dctycoon::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = dctycoon::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     dctycoon::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations are embedded and run automatically on startup:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! dctycoon::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod placement;
pub mod security;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::password,
    config::CorsOrigin,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    openapi::ApiDoc,
    security::{SecurityTick, SecurityTickScheduler},
};
use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{
    ContractId, DatacenterId, DeviceId, FirewallRuleId, IncidentId, LoadBalancerId, RackId, ScoreId, ServiceId, TransactionId, UserId,
};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder().db(pool).config(config).build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
}

/// Get the dctycoon database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: an existing account with the same email is promoted to admin, and its password is
/// replaced when one is given. Returns the admin's user ID.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = password
        .map(password::hash_string)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?;

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        if password_hash.is_some() || !existing_user.is_admin {
            user_repo
                .update(
                    existing_user.id,
                    &UserUpdateDBRequest {
                        is_active: None,
                        is_admin: Some(true),
                        password_hash,
                    },
                )
                .await?;
        }
        tx.commit().await?;
        return Ok(existing_user.id);
    }

    let created_user = user_repo
        .create(&UserCreateDBRequest {
            username: email.to_string(),
            email: email.to_string(),
            password_hash,
            is_admin: true,
        })
        .await?;

    tx.commit().await?;
    info!(user_id = %created_user.id, "Created initial admin user");
    Ok(created_user.id)
}

/// Connect (unless a pool is supplied), run migrations and make sure the admin account exists
async fn setup_database(config: &Config, pool: Option<PgPool>) -> anyhow::Result<PgPool> {
    let pool = match pool {
        Some(pool) => pool,
        None => {
            info!("Connecting to database");
            config.database.pool.connect_options().connect(&config.database.url).await?
        }
    };

    migrator().run(&pool).await?;

    create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.auth.cors.allowed_origins;
    // A wildcard may not appear inside an origin list
    let allow_origin = if allowed.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::with_capacity(allowed.len());
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([
            http::header::AUTHORIZATION,
            http::header::CONTENT_TYPE,
            http::HeaderName::from_static(auth::current_user::ACCESS_TOKEN_HEADER),
        ])
        .allow_credentials(config.auth.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Resource routes are nested under `/api`. Alongside them sit `/healthz`, the OpenAPI document
/// with its Scalar viewer, and `/internal/metrics` when metrics are enabled.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{
        auth, contracts, datacenters, devices, firewall_rules, incidents, load_balancers, racks, security, services, users, wallet,
    };

    let api_routes = Router::new()
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Admin
        .route("/admin/users", get(users::list_users))
        .route("/admin/users/{id}", patch(users::update_user))
        .route("/admin/security/tick", post(security::run_security_tick))
        // Wallet
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/withdraw", post(wallet::withdraw))
        // Datacenters and racks
        .route(
            "/datacenter-management/datacenters",
            get(datacenters::list_datacenters).post(datacenters::create_datacenter),
        )
        .route(
            "/datacenter-management/datacenters/{id}",
            get(datacenters::get_datacenter)
                .patch(datacenters::update_datacenter)
                .delete(datacenters::delete_datacenter),
        )
        .route(
            "/datacenter-management/datacenters/{id}/racks",
            get(racks::list_racks).post(racks::create_rack),
        )
        .route(
            "/datacenter-management/racks/{id}",
            get(racks::get_rack).patch(racks::update_rack).delete(racks::delete_rack),
        )
        .route("/datacenter-management/racks/{id}/devices", get(racks::list_rack_devices))
        .route("/datacenter-management/racks/{id}/free-slots", get(racks::free_slots))
        // Devices
        .route(
            "/datacenter-management/devices",
            get(devices::list_devices).post(devices::create_device),
        )
        .route(
            "/datacenter-management/devices/{id}",
            get(devices::get_device).patch(devices::update_device).delete(devices::delete_device),
        )
        .route("/datacenter-management/devices/{id}/move", post(devices::move_device))
        // Networking
        .route("/firewall-rules", get(firewall_rules::list_rules).post(firewall_rules::create_rule))
        .route(
            "/firewall-rules/{id}",
            get(firewall_rules::get_rule)
                .patch(firewall_rules::update_rule)
                .delete(firewall_rules::delete_rule),
        )
        .route("/firewall-rules/{id}/toggle", post(firewall_rules::toggle_rule))
        .route(
            "/load-balancers",
            get(load_balancers::list_load_balancers).post(load_balancers::create_load_balancer),
        )
        .route(
            "/load-balancers/{id}",
            get(load_balancers::get_load_balancer)
                .patch(load_balancers::update_load_balancer)
                .delete(load_balancers::delete_load_balancer),
        )
        .route("/load-balancers/{id}/traffic", patch(load_balancers::report_traffic))
        // Services and contracts
        .route("/services", get(services::list_services).post(services::create_service))
        .route(
            "/services/{id}",
            get(services::get_service).patch(services::update_service).delete(services::delete_service),
        )
        .route("/contracts", get(contracts::list_contracts).post(contracts::create_contract))
        .route(
            "/contracts/{id}",
            get(contracts::get_contract)
                .patch(contracts::update_contract)
                .delete(contracts::delete_contract),
        )
        .route("/contracts/{id}/terminate", post(contracts::terminate_contract))
        .route("/contracts/{id}/compliance", get(contracts::contract_compliance))
        // Security
        .route("/security/overview", get(security::security_overview))
        .route("/security/scores", get(security::list_scores))
        .route("/incidents", get(incidents::list_incidents))
        .route("/incidents/{id}/resolve", post(incidents::resolve_incident))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks that run alongside the HTTP server.
///
/// [`shutdown`](BackgroundServices::shutdown) cancels the shared token and waits for every task.
/// Dropping the struct cancels the token through `drop_guard` without waiting.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the security tick scheduler when it is enabled
fn setup_background_services(
    pool: PgPool,
    config: &Config,
    shutdown_token: tokio_util::sync::CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let tick_config = &config.background_services.security_tick;
    if tick_config.enabled {
        let scheduler = SecurityTickScheduler::new(SecurityTick::new(pool, tick_config.clone()), tick_config.interval);
        let scheduler_shutdown = shutdown_token.clone();
        background_tasks.push(tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        }));
    } else {
        info!("Security tick disabled by configuration");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects, runs migrations, ensures the admin account and
///    starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: when the shutdown future resolves, background services are stopped and the
///    pool is closed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing an existing pool when one is given
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting dctycoon with configuration: {:#?}", config);

        let pool = setup_database(&config, pool).await?;

        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let bg_services = setup_background_services(pool.clone(), &config, shutdown_token);

        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "dctycoon listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::create_initial_admin_user;
    use crate::{
        api::models::auth::AuthResponse,
        db::handlers::{Repository, Users},
        test_utils::*,
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_initial_admin_user_is_idempotent(pool: PgPool) {
        let first = create_initial_admin_user("boss@example.com", Some("first-password"), &pool).await.unwrap();
        let second = create_initial_admin_user("boss@example.com", Some("second-password"), &pool)
            .await
            .unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let admin = Users::new(&mut conn).get_by_id(first).await.unwrap().unwrap();
        assert!(admin.is_admin);

        let (server, _bg) = create_test_app(pool.clone()).await;
        server
            .post("/api/auth/login")
            .json(&json!({"email": "boss@example.com", "password": "first-password"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        let auth: AuthResponse = server
            .post("/api/auth/login")
            .json(&json!({"email": "boss@example.com", "password": "second-password"}))
            .await
            .json();
        assert!(auth.user.is_admin);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_existing_player_is_promoted(pool: PgPool) {
        let player = create_test_user(&pool, false).await;
        let id = create_initial_admin_user(&player.email, None, &pool).await.unwrap();
        assert_eq!(id, player.id);

        let mut conn = pool.acquire().await.unwrap();
        let promoted = Users::new(&mut conn).get_by_id(id).await.unwrap().unwrap();
        assert!(promoted.is_admin);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_public_routes_and_token_guard(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;

        server.get("/healthz").await.assert_text("OK");

        let doc: serde_json::Value = server.get("/api-docs/openapi.json").await.json();
        assert!(doc["paths"]["/datacenter-management/racks/{id}/free-slots"].is_object());
        assert!(doc["components"]["securitySchemes"]["AccessToken"].is_object());

        server.get("/api/wallet").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/api/datacenter-management/datacenters")
            .add_header("authorization", "Bearer not-a-token")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let user = create_test_user(&pool, false).await;
        let (name, value) = auth_header_for(&user);
        server.get("/api/wallet").add_header(name, value).await.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_background_services_shut_down(pool: PgPool) {
        let mut config = create_test_config();
        config.background_services.security_tick.enabled = true;
        config.background_services.security_tick.interval = std::time::Duration::from_secs(3600);

        let app = crate::Application::new_with_pool(config, Some(pool)).await.unwrap();
        let (_server, bg) = app.into_test_server();

        tokio::time::timeout(std::time::Duration::from_secs(5), bg.shutdown())
            .await
            .expect("background services did not stop");
    }
}
