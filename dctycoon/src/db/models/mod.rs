//! Database record structures matching table schemas.
//!
//! Each submodule holds the `*CreateDBRequest`, `*UpdateDBRequest` and `*DBResponse` types for one
//! table, plus the enums stored in that table as snake_case `TEXT`. API-facing shapes live in
//! [`crate::api::models`] and are built from these.

pub mod contracts;
pub mod datacenters;
pub mod devices;
pub mod firewall_rules;
pub mod incidents;
pub mod load_balancers;
pub mod racks;
pub mod security_scores;
pub mod services;
pub mod users;
pub mod wallet;
