//! HTTP API: route handlers and their request/response models.
//!
//! All resource routes are mounted under `/api`:
//!
//! - **Authentication** (`/api/auth/*`): registration, login, logout, current user
//! - **Wallet** (`/api/wallet/*`): balance, deposits, withdrawals, transaction history
//! - **Infrastructure** (`/api/datacenter-management/*`): datacenters, racks, devices
//! - **Networking** (`/api/firewall-rules/*`, `/api/load-balancers/*`)
//! - **Business** (`/api/services/*`, `/api/contracts/*`)
//! - **Security** (`/api/security/*`, `/api/incidents/*`)
//! - **Admin** (`/api/admin/*`): user management and manual security sweeps
//!
//! The OpenAPI document is served at `/api-docs/openapi.json` with an interactive viewer at `/docs`.

pub mod handlers;
pub mod models;
