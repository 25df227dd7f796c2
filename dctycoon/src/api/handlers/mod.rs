//! Axum route handlers, one module per resource.
//!
//! Handlers authenticate through the [`crate::api::models::users::CurrentUser`] extractor,
//! validate request bodies, and delegate persistence to the repositories in
//! [`crate::db::handlers`]. Records owned by another player are reported as not found.
//! Every handler returns [`crate::errors::Result`], which renders errors as HTTP responses.

pub mod auth;
pub mod contracts;
pub mod datacenters;
pub mod devices;
pub mod firewall_rules;
pub mod incidents;
pub mod load_balancers;
pub mod racks;
pub mod security;
pub mod services;
pub mod users;
pub mod wallet;
