use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::devices::{DeviceCreateDBRequest, DeviceDBResponse, DeviceUpdateDBRequest},
};
use crate::types::{DeviceId, RackId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter options for listing devices
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub owner_id: Option<UserId>,
    pub rack_id: Option<RackId>,
    /// Only devices sitting in inventory
    pub unracked: bool,
    pub skip: i64,
    pub limit: i64,
}

impl DeviceFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }
}

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::uuid IS NULL OR owner_id = $1)
      AND ($2::uuid IS NULL OR rack_id = $2)
      AND (NOT $3 OR rack_id IS NULL)
"#;

pub struct Devices<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Devices<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &DeviceFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM devices {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.owner_id)
            .bind(filter.rack_id)
            .bind(filter.unracked)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Lock the device row for the rest of the transaction. A missing row is left to the caller.
    #[instrument(skip(self), fields(device_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: DeviceId) -> Result<()> {
        sqlx::query("SELECT id FROM devices WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Move a device into a rack slot, or back to inventory when `placement` is `None`.
    ///
    /// Callers validate the slot while holding the rack lock.
    #[instrument(skip(self), fields(device_id = %abbrev_uuid(&id)), err)]
    pub async fn set_placement(&mut self, id: DeviceId, placement: Option<(RackId, i32)>) -> Result<DeviceDBResponse> {
        let (rack_id, start_unit) = placement.unzip();
        let device = sqlx::query_as::<_, DeviceDBResponse>(
            r#"
            UPDATE devices SET rack_id = $2, start_unit = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(rack_id)
        .bind(start_unit)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(device)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Devices<'c> {
    type CreateRequest = DeviceCreateDBRequest;
    type UpdateRequest = DeviceUpdateDBRequest;
    type Response = DeviceDBResponse;
    type Id = DeviceId;
    type Filter = DeviceFilter;

    #[instrument(skip(self, request), fields(name = %request.name, device_type = ?request.device_type), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let device = sqlx::query_as::<_, DeviceDBResponse>(
            r#"
            INSERT INTO devices (id, owner_id, rack_id, start_unit, name, device_type, manufacturer, model,
                serial_number, unit_size, power_draw_kw, status, purchase_price, purchase_date, warranty_months)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.rack_id)
        .bind(request.start_unit)
        .bind(&request.name)
        .bind(request.device_type)
        .bind(&request.manufacturer)
        .bind(&request.model)
        .bind(&request.serial_number)
        .bind(request.unit_size)
        .bind(request.power_draw_kw)
        .bind(request.status)
        .bind(request.purchase_price)
        .bind(request.purchase_date)
        .bind(request.warranty_months)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(device)
    }

    #[instrument(skip(self), fields(device_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let device = sqlx::query_as::<_, DeviceDBResponse>("SELECT * FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(device)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let devices = sqlx::query_as::<_, DeviceDBResponse>("SELECT * FROM devices WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(devices.into_iter().map(|d| (d.id, d)).collect())
    }

    /// Racked devices come out in unit order, inventory by creation time
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!(
            "SELECT * FROM devices {FILTER_CLAUSE} ORDER BY rack_id NULLS LAST, start_unit ASC, created_at ASC, id ASC OFFSET $4 LIMIT $5"
        );
        let devices = sqlx::query_as::<_, DeviceDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.rack_id)
            .bind(filter.unracked)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(devices)
    }

    #[instrument(skip(self), fields(device_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(device_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let device = sqlx::query_as::<_, DeviceDBResponse>(
            r#"
            UPDATE devices SET
                name = COALESCE($2, name),
                manufacturer = COALESCE($3, manufacturer),
                model = COALESCE($4, model),
                serial_number = COALESCE($5, serial_number),
                power_draw_kw = COALESCE($6, power_draw_kw),
                status = COALESCE($7, status),
                warranty_months = COALESCE($8, warranty_months),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.manufacturer)
        .bind(&request.model)
        .bind(&request.serial_number)
        .bind(request.power_draw_kw)
        .bind(request.status)
        .bind(request.warranty_months)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(device)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::handlers::{Datacenters, Racks, datacenters::tests::new_datacenter, racks::tests::new_rack};
    use crate::db::models::devices::{DeviceStatus, DeviceType};
    use crate::test_utils::create_test_user;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    pub(crate) fn new_device(owner_id: UserId, placement: Option<(RackId, i32)>) -> DeviceCreateDBRequest {
        let (rack_id, start_unit) = placement.unzip();
        DeviceCreateDBRequest {
            owner_id,
            rack_id,
            start_unit,
            name: "web-01".to_string(),
            device_type: DeviceType::Server,
            manufacturer: Some("Dell".to_string()),
            model: Some("R650".to_string()),
            serial_number: None,
            unit_size: 1,
            power_draw_kw: 0.5,
            status: DeviceStatus::Online,
            purchase_price: Decimal::ZERO,
            purchase_date: Utc::now(),
            warranty_months: 36,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_filters(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();
        let rack = Racks::new(&mut conn).create(&new_rack(dc.id, "a01")).await.unwrap();

        let mut devices = Devices::new(&mut conn);
        let racked = devices.create(&new_device(user.id, Some((rack.id, 5)))).await.unwrap();
        let spare = devices.create(&new_device(user.id, None)).await.unwrap();

        let mut in_rack = DeviceFilter::new(0, 10);
        in_rack.rack_id = Some(rack.id);
        let listed = devices.list(&in_rack).await.unwrap();
        assert_eq!(listed.iter().map(|d| d.id).collect::<Vec<_>>(), vec![racked.id]);

        let mut inventory = DeviceFilter::new(0, 10);
        inventory.unracked = true;
        let listed = devices.list(&inventory).await.unwrap();
        assert_eq!(listed.iter().map(|d| d.id).collect::<Vec<_>>(), vec![spare.id]);

        let mut mine = DeviceFilter::new(0, 10);
        mine.owner_id = Some(user.id);
        assert_eq!(devices.count(&mine).await.unwrap(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_placement_pair_is_enforced(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();
        let rack = Racks::new(&mut conn).create(&new_rack(dc.id, "a01")).await.unwrap();

        let mut half_placed = new_device(user.id, None);
        half_placed.rack_id = Some(rack.id);
        let result = Devices::new(&mut conn).create(&half_placed).await;
        assert!(matches!(result, Err(DbError::CheckViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_placement_and_back(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();
        let rack = Racks::new(&mut conn).create(&new_rack(dc.id, "a01")).await.unwrap();

        let mut devices = Devices::new(&mut conn);
        let device = devices.create(&new_device(user.id, None)).await.unwrap();

        let placed = devices.set_placement(device.id, Some((rack.id, 7))).await.unwrap();
        assert_eq!((placed.rack_id, placed.start_unit), (Some(rack.id), Some(7)));
        assert!(placed.occupant().is_some());

        let unplaced = devices.set_placement(device.id, None).await.unwrap();
        assert_eq!((unplaced.rack_id, unplaced.start_unit), (None, None));
        assert!(unplaced.occupant().is_none());
    }
}
