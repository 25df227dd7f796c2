//! OpenAPI document for the `/api` surface, served at `/api-docs/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;
use crate::db::models;

/// Both ways a client can present its access token.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from `/auth/login` or `/auth/register`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "AccessToken".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "access-token",
                    "The same token in a dedicated header, for game clients that cannot set `Authorization`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    servers((url = "/api")),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::me,
        api::handlers::users::list_users,
        api::handlers::users::update_user,
        api::handlers::wallet::get_wallet,
        api::handlers::wallet::list_transactions,
        api::handlers::wallet::deposit,
        api::handlers::wallet::withdraw,
        api::handlers::datacenters::list_datacenters,
        api::handlers::datacenters::create_datacenter,
        api::handlers::datacenters::get_datacenter,
        api::handlers::datacenters::update_datacenter,
        api::handlers::datacenters::delete_datacenter,
        api::handlers::racks::list_racks,
        api::handlers::racks::create_rack,
        api::handlers::racks::get_rack,
        api::handlers::racks::update_rack,
        api::handlers::racks::delete_rack,
        api::handlers::racks::list_rack_devices,
        api::handlers::racks::free_slots,
        api::handlers::devices::list_devices,
        api::handlers::devices::create_device,
        api::handlers::devices::get_device,
        api::handlers::devices::update_device,
        api::handlers::devices::move_device,
        api::handlers::devices::delete_device,
        api::handlers::firewall_rules::list_rules,
        api::handlers::firewall_rules::create_rule,
        api::handlers::firewall_rules::get_rule,
        api::handlers::firewall_rules::update_rule,
        api::handlers::firewall_rules::toggle_rule,
        api::handlers::firewall_rules::delete_rule,
        api::handlers::load_balancers::list_load_balancers,
        api::handlers::load_balancers::create_load_balancer,
        api::handlers::load_balancers::get_load_balancer,
        api::handlers::load_balancers::update_load_balancer,
        api::handlers::load_balancers::report_traffic,
        api::handlers::load_balancers::delete_load_balancer,
        api::handlers::services::list_services,
        api::handlers::services::create_service,
        api::handlers::services::get_service,
        api::handlers::services::update_service,
        api::handlers::services::delete_service,
        api::handlers::contracts::list_contracts,
        api::handlers::contracts::create_contract,
        api::handlers::contracts::get_contract,
        api::handlers::contracts::update_contract,
        api::handlers::contracts::delete_contract,
        api::handlers::contracts::terminate_contract,
        api::handlers::contracts::contract_compliance,
        api::handlers::security::security_overview,
        api::handlers::security::list_scores,
        api::handlers::security::run_security_tick,
        api::handlers::incidents::list_incidents,
        api::handlers::incidents::resolve_incident,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::users::CurrentUser,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::wallet::WalletResponse,
            api::models::wallet::WalletMovement,
            api::models::wallet::TransactionResponse,
            api::models::datacenters::DatacenterCreate,
            api::models::datacenters::DatacenterUpdate,
            api::models::datacenters::DatacenterResponse,
            api::models::racks::RackCreate,
            api::models::racks::RackUpdate,
            api::models::racks::RackResponse,
            api::models::racks::FreeSlotsResponse,
            api::models::devices::DeviceCreate,
            api::models::devices::DeviceUpdate,
            api::models::devices::DeviceMove,
            api::models::devices::DeviceResponse,
            api::models::firewall_rules::FirewallRuleCreate,
            api::models::firewall_rules::FirewallRuleUpdate,
            api::models::firewall_rules::FirewallRuleResponse,
            api::models::load_balancers::LoadBalancerCreate,
            api::models::load_balancers::LoadBalancerUpdate,
            api::models::load_balancers::TrafficUpdate,
            api::models::load_balancers::LoadBalancerResponse,
            api::models::services::ServiceCreate,
            api::models::services::ServiceUpdate,
            api::models::services::ServiceResponse,
            api::models::contracts::ContractCreate,
            api::models::contracts::ContractUpdate,
            api::models::contracts::ContractResponse,
            api::models::contracts::ComplianceResponse,
            api::models::security::SecurityScoreResponse,
            api::models::security::SecurityOverview,
            api::models::security::IncidentResponse,
            crate::placement::FreeRange,
            crate::security::scoring::SecurityScores,
            crate::security::sla::SlaEvaluation,
            crate::security::TickReport,
            models::wallet::TransactionType,
            models::datacenters::FacilityStatus,
            models::devices::DeviceType,
            models::devices::DeviceStatus,
            models::firewall_rules::RuleAction,
            models::firewall_rules::Direction,
            models::firewall_rules::Protocol,
            models::load_balancers::Algorithm,
            models::load_balancers::LoadBalancerStatus,
            models::services::ServiceType,
            models::services::ServiceStatus,
            models::contracts::ContractStatus,
            models::incidents::IncidentSourceType,
            models::incidents::IncidentKind,
            models::incidents::Severity,
        )
    ),
    tags(
        (name = "auth", description = "Register, log in and inspect the current player."),
        (name = "wallet", description = "Balance and the append-only ledger of money movements."),
        (name = "datacenters", description = "Facilities with a rack limit and power and cooling budgets."),
        (name = "racks", description = "Racks inside a datacenter, with free-slot lookup for placement."),
        (name = "devices", description = "Purchased hardware. A racked device occupies a contiguous block of units
and draws power from both the rack and the datacenter budget."),
        (name = "firewall-rules", description = "Per-datacenter rules, evaluated by priority. Input to the firewall score."),
        (name = "load-balancers", description = "Backends, capacity and reported traffic. Input to the load balancer score."),
        (name = "services", description = "Hosted services whose uptime the security tick tracks."),
        (name = "contracts", description = "SLA contracts sold against services, with penalties on breach."),
        (name = "security", description = "Security scores, score history and incidents raised by the security tick."),
        (name = "admin", description = "Player management and manual security sweeps. Admin only."),
    ),
    info(
        title = "Datacenter Tycoon API",
        version = "1.0.0",
        description = "Backend for a datacenter tycoon game.

## Authentication

Every route except registration and login needs the access token returned by those two calls, either as
`Authorization: Bearer TOKEN` or in an `access-token` header.

## Errors

Errors are returned as plain text with the matching status code, except conflicts and validation failures
which carry a JSON body.",
    ),
)]
pub struct ApiDoc;
