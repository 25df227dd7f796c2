//! API request/response models for devices.

use super::pagination::Pagination;
use super::money::price;
use crate::db::models::devices::{DeviceDBResponse, DeviceStatus, DeviceType};
use crate::types::{DeviceId, RackId, UserId};
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

fn default_unit_size() -> i32 {
    1
}

fn default_warranty_months() -> i32 {
    36
}

/// Buy a device. With `rack_id` it is installed immediately, at `start_unit` or the lowest free
/// block when omitted. Without it the device goes to inventory.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DeviceCreate {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub rack_id: Option<RackId>,
    #[validate(range(min = 1))]
    pub start_unit: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub device_type: DeviceType,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    #[serde(default = "default_unit_size")]
    #[validate(range(min = 1, max = 60))]
    #[schema(default = 1)]
    pub unit_size: i32,
    #[validate(range(min = 0.0))]
    pub power_draw_kw: f64,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Debited from the wallet when positive
    #[serde(default)]
    #[validate(custom(function = "price"))]
    #[schema(value_type = f64)]
    pub purchase_price: Decimal,
    /// Defaults to now
    pub purchase_date: Option<DateTime<Utc>>,
    #[serde(default = "default_warranty_months")]
    #[validate(range(min = 0, max = 240))]
    #[schema(default = 36)]
    pub warranty_months: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct DeviceUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    #[validate(range(min = 0.0))]
    pub power_draw_kw: Option<f64>,
    pub status: Option<DeviceStatus>,
    #[validate(range(min = 0, max = 240))]
    pub warranty_months: Option<i32>,
}

/// Move a device. Without `rack_id` it is taken out of its rack into inventory.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct DeviceMove {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub rack_id: Option<RackId>,
    #[validate(range(min = 1))]
    pub start_unit: Option<i32>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListDevicesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
    /// Only devices in this rack
    #[param(value_type = Option<String>)]
    pub rack_id: Option<RackId>,
    /// Only devices not installed in any rack
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub unracked: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: DeviceId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub rack_id: Option<RackId>,
    pub name: String,
    pub device_type: DeviceType,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub start_unit: Option<i32>,
    /// Top unit occupied, set only for racked devices
    pub end_unit: Option<i32>,
    pub unit_size: i32,
    pub power_draw_kw: f64,
    pub status: DeviceStatus,
    #[schema(value_type = f64)]
    pub purchase_price: Decimal,
    pub purchase_date: DateTime<Utc>,
    pub warranty_months: i32,
    pub warranty_expires_at: DateTime<Utc>,
    pub warranty_valid: bool,
    pub age_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceResponse {
    /// Build the response with derived fields evaluated at `now`
    pub fn at(db: DeviceDBResponse, now: DateTime<Utc>) -> Self {
        let warranty_expires_at = db
            .purchase_date
            .checked_add_months(Months::new(db.warranty_months.max(0) as u32))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let end_unit = match (db.rack_id, db.start_unit) {
            (Some(_), Some(start)) => Some(start + db.unit_size - 1),
            _ => None,
        };

        Self {
            end_unit,
            warranty_expires_at,
            warranty_valid: now < warranty_expires_at,
            age_days: (now - db.purchase_date).num_days().max(0),
            id: db.id,
            owner_id: db.owner_id,
            rack_id: db.rack_id,
            name: db.name,
            device_type: db.device_type,
            manufacturer: db.manufacturer,
            model: db.model,
            serial_number: db.serial_number,
            start_unit: db.start_unit,
            unit_size: db.unit_size,
            power_draw_kw: db.power_draw_kw,
            status: db.status,
            purchase_price: db.purchase_price,
            purchase_date: db.purchase_date,
            warranty_months: db.warranty_months,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<DeviceDBResponse> for DeviceResponse {
    fn from(db: DeviceDBResponse) -> Self {
        Self::at(db, Utc::now())
    }
}
