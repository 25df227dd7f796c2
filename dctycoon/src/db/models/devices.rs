//! Database models for devices.

use crate::placement::Occupant;
use crate::types::{DeviceId, RackId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Server,
    Switch,
    Router,
    Firewall,
    Storage,
    LoadBalancer,
    Pdu,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
    Maintenance,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DeviceCreateDBRequest {
    pub owner_id: UserId,
    pub rack_id: Option<RackId>,
    pub start_unit: Option<i32>,
    pub name: String,
    pub device_type: DeviceType,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub unit_size: i32,
    pub power_draw_kw: f64,
    pub status: DeviceStatus,
    pub purchase_price: Decimal,
    pub purchase_date: DateTime<Utc>,
    pub warranty_months: i32,
}

/// Field updates. Placement changes go through [`crate::db::handlers::Devices::set_placement`].
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdateDBRequest {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub power_draw_kw: Option<f64>,
    pub status: Option<DeviceStatus>,
    pub warranty_months: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DeviceDBResponse {
    pub id: DeviceId,
    pub owner_id: UserId,
    pub rack_id: Option<RackId>,
    pub name: String,
    pub device_type: DeviceType,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub start_unit: Option<i32>,
    pub unit_size: i32,
    pub power_draw_kw: f64,
    pub status: DeviceStatus,
    pub purchase_price: Decimal,
    pub purchase_date: DateTime<Utc>,
    pub warranty_months: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceDBResponse {
    /// The units this device occupies, if it is racked
    pub fn occupant(&self) -> Option<Occupant> {
        match (self.rack_id, self.start_unit) {
            (Some(_), Some(start)) => Some(Occupant {
                device_id: self.id,
                start_unit: start.max(0) as u32,
                unit_size: self.unit_size.max(0) as u32,
            }),
            _ => None,
        }
    }
}
