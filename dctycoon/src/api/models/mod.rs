//! API request and response data models.
//!
//! These structures define the public API contract and are kept apart from the database
//! records in [`crate::db::models`], so storage and API can evolve independently. Derived
//! figures such as utilization percentages or warranty state are computed in the `From`
//! conversions and never stored.
//!
//! Request bodies derive [`validator::Validate`]; handlers call `validate()` before touching the
//! database and field errors come back as 422. Every model carries `utoipa` annotations for the
//! generated OpenAPI document.
//!
//! # Model Categories
//!
//! - [`auth`], [`users`]: registration, login and account management
//! - [`wallet`]: balance and ledger entries
//! - [`datacenters`], [`racks`], [`devices`]: physical infrastructure
//! - [`firewall_rules`], [`load_balancers`]: network configuration
//! - [`services`], [`contracts`]: customer-facing business
//! - [`security`]: scores and incidents produced by the security tick
//! - [`pagination`]: shared `skip`/`limit` handling
//! - [`money`]: precision and range checks for decimal amounts

pub mod auth;
pub mod contracts;
pub mod datacenters;
pub mod devices;
pub mod firewall_rules;
pub mod load_balancers;
pub mod money;
pub mod pagination;
pub mod racks;
pub mod security;
pub mod services;
pub mod users;
pub mod wallet;
