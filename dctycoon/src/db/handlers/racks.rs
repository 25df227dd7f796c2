use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::racks::{RackCreateDBRequest, RackDBResponse, RackUpdateDBRequest},
};
use crate::placement::Occupant;
use crate::types::{DatacenterId, DeviceId, RackId, UserId, abbrev_uuid};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Rack columns plus owner and occupancy of racked devices
const SELECT_RACK: &str = r#"
    SELECT r.*, d.owner_id,
        (SELECT COUNT(*) FROM devices dev WHERE dev.rack_id = r.id) AS device_count,
        (SELECT COALESCE(SUM(dev.unit_size), 0)::bigint FROM devices dev WHERE dev.rack_id = r.id) AS used_units,
        (SELECT COALESCE(SUM(dev.power_draw_kw), 0)::float8 FROM devices dev WHERE dev.rack_id = r.id) AS power_used_kw
    FROM racks r
    JOIN datacenters d ON d.id = r.datacenter_id
"#;

/// Filter options for listing racks
#[derive(Debug, Clone)]
pub struct RackFilter {
    pub datacenter_id: Option<DatacenterId>,
    pub owner_id: Option<UserId>,
    pub skip: i64,
    pub limit: i64,
}

impl RackFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            datacenter_id: None,
            owner_id: None,
            skip,
            limit,
        }
    }

    pub fn in_datacenter(mut self, datacenter_id: DatacenterId) -> Self {
        self.datacenter_id = Some(datacenter_id);
        self
    }
}

#[derive(FromRow)]
struct OccupantRow {
    id: DeviceId,
    start_unit: i32,
    unit_size: i32,
}

pub struct Racks<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Racks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &RackFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM racks r JOIN datacenters d ON d.id = r.datacenter_id
            WHERE ($1::uuid IS NULL OR r.datacenter_id = $1) AND ($2::uuid IS NULL OR d.owner_id = $2)
            "#,
        )
        .bind(filter.datacenter_id)
        .bind(filter.owner_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }

    /// Lock the rack row so placement checks and the write that follows see the same occupancy
    #[instrument(skip(self), fields(rack_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: RackId) -> Result<()> {
        sqlx::query("SELECT id FROM racks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(())
    }

    /// Units taken by the devices racked in `id`
    #[instrument(skip(self), fields(rack_id = %abbrev_uuid(&id)), err)]
    pub async fn occupants(&mut self, id: RackId) -> Result<Vec<Occupant>> {
        let rows = sqlx::query_as::<_, OccupantRow>(
            "SELECT id, start_unit, unit_size FROM devices WHERE rack_id = $1 AND start_unit IS NOT NULL ORDER BY start_unit",
        )
        .bind(id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Occupant {
                device_id: r.id,
                start_unit: r.start_unit.max(0) as u32,
                unit_size: r.unit_size.max(0) as u32,
            })
            .collect())
    }

    /// Power drawn by devices in the rack, optionally ignoring one device
    #[instrument(skip(self), fields(rack_id = %abbrev_uuid(&id)), err)]
    pub async fn power_used_kw(&mut self, id: RackId, exclude_device: Option<DeviceId>) -> Result<f64> {
        let used = sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(SUM(power_draw_kw), 0)::float8 FROM devices WHERE rack_id = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(id)
        .bind(exclude_device)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(used)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Racks<'c> {
    type CreateRequest = RackCreateDBRequest;
    type UpdateRequest = RackUpdateDBRequest;
    type Response = RackDBResponse;
    type Id = RackId;
    type Filter = RackFilter;

    #[instrument(skip(self, request), fields(name = %request.name, datacenter_id = %abbrev_uuid(&request.datacenter_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO racks (id, datacenter_id, name, total_units, max_power_kw, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(request.datacenter_id)
        .bind(&request.name)
        .bind(request.total_units)
        .bind(request.max_power_kw)
        .bind(request.status)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(rack_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let query = format!("{SELECT_RACK} WHERE r.id = $1");
        let rack = sqlx::query_as::<_, RackDBResponse>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(rack)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let query = format!("{SELECT_RACK} WHERE r.id = ANY($1)");
        let racks = sqlx::query_as::<_, RackDBResponse>(&query)
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(racks.into_iter().map(|r| (r.id, r)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!(
            "{SELECT_RACK} WHERE ($1::uuid IS NULL OR r.datacenter_id = $1) AND ($2::uuid IS NULL OR d.owner_id = $2) \
             ORDER BY r.created_at ASC, r.id ASC OFFSET $3 LIMIT $4"
        );
        let racks = sqlx::query_as::<_, RackDBResponse>(&query)
            .bind(filter.datacenter_id)
            .bind(filter.owner_id)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(racks)
    }

    /// Fails with a foreign key violation while devices remain
    #[instrument(skip(self), fields(rack_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM racks WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(rack_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query(
            r#"
            UPDATE racks SET
                name = COALESCE($2, name),
                total_units = COALESCE($3, total_units),
                max_power_kw = COALESCE($4, max_power_kw),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.total_units)
        .bind(request.max_power_kw)
        .bind(request.status)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::handlers::{Datacenters, Devices, datacenters::tests::new_datacenter, devices::tests::new_device};
    use crate::db::models::datacenters::FacilityStatus;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    pub(crate) fn new_rack(datacenter_id: DatacenterId, name: &str) -> RackCreateDBRequest {
        RackCreateDBRequest {
            datacenter_id,
            name: name.to_string(),
            total_units: 42,
            max_power_kw: 10.0,
            status: FacilityStatus::Active,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rack_aggregates_follow_devices(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();
        let rack = Racks::new(&mut conn).create(&new_rack(dc.id, "a01")).await.unwrap();
        assert_eq!(rack.owner_id, user.id);
        assert_eq!(rack.used_units, 0);

        let mut server = new_device(user.id, Some((rack.id, 1)));
        server.unit_size = 2;
        server.power_draw_kw = 0.75;
        Devices::new(&mut conn).create(&server).await.unwrap();
        Devices::new(&mut conn).create(&new_device(user.id, Some((rack.id, 10)))).await.unwrap();

        let mut racks = Racks::new(&mut conn);
        let rack = racks.get_by_id(rack.id).await.unwrap().unwrap();
        assert_eq!(rack.device_count, 2);
        assert_eq!(rack.used_units, 3);
        assert!((rack.power_used_kw - 1.25).abs() < 1e-9);

        let occupants = racks.occupants(rack.id).await.unwrap();
        assert_eq!(occupants.iter().map(|o| o.start_unit).collect::<Vec<_>>(), vec![1, 10]);

        let dc = Datacenters::new(&mut conn).get_by_id(dc.id).await.unwrap().unwrap();
        assert!((dc.power_used_kw - 1.25).abs() < 1e-9);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_with_devices_is_restricted(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();
        let rack = Racks::new(&mut conn).create(&new_rack(dc.id, "a01")).await.unwrap();
        Devices::new(&mut conn).create(&new_device(user.id, Some((rack.id, 1)))).await.unwrap();

        let result = Racks::new(&mut conn).delete(rack.id).await;
        assert!(matches!(result, Err(DbError::ForeignKeyViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_by_datacenter_and_owner(pool: PgPool) {
        let alice = create_test_user(&pool, false).await;
        let bob = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let a = Datacenters::new(&mut conn).create(&new_datacenter(alice.id, "a")).await.unwrap();
        let b = Datacenters::new(&mut conn).create(&new_datacenter(bob.id, "b")).await.unwrap();
        let mut racks = Racks::new(&mut conn);
        racks.create(&new_rack(a.id, "r1")).await.unwrap();
        racks.create(&new_rack(a.id, "r2")).await.unwrap();
        racks.create(&new_rack(b.id, "r1")).await.unwrap();

        let in_a = racks.list(&RackFilter::new(0, 10).in_datacenter(a.id)).await.unwrap();
        assert_eq!(in_a.len(), 2);

        let mut bobs = RackFilter::new(0, 10);
        bobs.owner_id = Some(bob.id);
        assert_eq!(racks.count(&bobs).await.unwrap(), 1);

        let duplicate = racks.create(&new_rack(a.id, "r1")).await;
        assert!(matches!(duplicate, Err(DbError::UniqueViolation { .. })));
    }
}
