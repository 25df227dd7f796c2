//! Authentication and authorization.
//!
//! Players register or log in through `/api/auth` and receive an HS256 JWT. Every other `/api`
//! route extracts [`CurrentUser`](crate::api::models::users::CurrentUser), which accepts the token
//! from the `access-token` header or `Authorization: Bearer <token>`, verifies it, and re-reads
//! the account so that deactivated or deleted players are locked out immediately.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for the authenticated user in handlers
//! - [`password`]: Password hashing and verification using Argon2
//! - [`permissions`]: Admin and ownership checks
//! - [`session`]: JWT issue and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use dctycoon::api::models::users::CurrentUser;
//! use dctycoon::auth::permissions::ensure_owner;
//!
//! async fn get_rack(current_user: CurrentUser, /* ... */) -> Result<Json<RackResponse>> {
//!     let rack = /* load */;
//!     ensure_owner(&current_user, rack.owner_id, "Rack", rack.id)?;
//!     Ok(Json(rack.into()))
//! }
//! ```

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
