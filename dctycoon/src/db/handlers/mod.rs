//! Repository implementations, one per table.

pub mod contracts;
pub mod datacenters;
pub mod devices;
pub mod firewall_rules;
pub mod incidents;
pub mod load_balancers;
pub mod racks;
pub mod repository;
pub mod security_scores;
pub mod services;
pub mod users;
pub mod wallet;

pub use contracts::Contracts;
pub use datacenters::Datacenters;
pub use devices::Devices;
pub use firewall_rules::FirewallRules;
pub use incidents::Incidents;
pub use load_balancers::LoadBalancers;
pub use racks::Racks;
pub use repository::Repository;
pub use security_scores::SecurityScores;
pub use services::Services;
pub use users::Users;
pub use wallet::Wallet;
