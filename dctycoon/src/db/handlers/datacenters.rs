use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::datacenters::{DatacenterCreateDBRequest, DatacenterDBResponse, DatacenterUpdateDBRequest},
};
use crate::types::{DatacenterId, DeviceId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Datacenter columns plus rack count and power drawn by racked devices
const SELECT_DATACENTER: &str = r#"
    SELECT d.*,
        (SELECT COUNT(*) FROM racks r WHERE r.datacenter_id = d.id) AS rack_count,
        (SELECT COALESCE(SUM(dev.power_draw_kw), 0)::float8
            FROM devices dev JOIN racks r ON r.id = dev.rack_id
            WHERE r.datacenter_id = d.id) AS power_used_kw
    FROM datacenters d
"#;

/// Filter options for listing datacenters. `owner_id: None` lists every player's.
#[derive(Debug, Clone)]
pub struct DatacenterFilter {
    pub owner_id: Option<UserId>,
    pub skip: i64,
    pub limit: i64,
}

impl DatacenterFilter {
    pub fn new(owner_id: Option<UserId>, skip: i64, limit: i64) -> Self {
        Self { owner_id, skip, limit }
    }
}

pub struct Datacenters<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Datacenters<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &DatacenterFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM datacenters WHERE ($1::uuid IS NULL OR owner_id = $1)")
            .bind(filter.owner_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Every datacenter a player owns, for the security tick
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn list_for_owner(&mut self, owner_id: UserId) -> Result<Vec<DatacenterDBResponse>> {
        let query = format!("{SELECT_DATACENTER} WHERE d.owner_id = $1 ORDER BY d.created_at ASC, d.id ASC");
        let datacenters = sqlx::query_as::<_, DatacenterDBResponse>(&query)
            .bind(owner_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(datacenters)
    }

    /// Lock the datacenter row for the rest of the transaction
    #[instrument(skip(self), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: DatacenterId) -> Result<()> {
        sqlx::query("SELECT id FROM datacenters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(())
    }

    /// Power drawn by racked devices in the datacenter, optionally ignoring one device
    #[instrument(skip(self), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    pub async fn power_used_kw(&mut self, id: DatacenterId, exclude_device: Option<DeviceId>) -> Result<f64> {
        let used = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT COALESCE(SUM(dev.power_draw_kw), 0)::float8
            FROM devices dev JOIN racks r ON r.id = dev.rack_id
            WHERE r.datacenter_id = $1 AND ($2::uuid IS NULL OR dev.id <> $2)
            "#,
        )
        .bind(id)
        .bind(exclude_device)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(used)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Datacenters<'c> {
    type CreateRequest = DatacenterCreateDBRequest;
    type UpdateRequest = DatacenterUpdateDBRequest;
    type Response = DatacenterDBResponse;
    type Id = DatacenterId;
    type Filter = DatacenterFilter;

    #[instrument(skip(self, request), fields(name = %request.name, owner_id = %abbrev_uuid(&request.owner_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let datacenter = sqlx::query_as::<_, DatacenterDBResponse>(
            r#"
            INSERT INTO datacenters (id, owner_id, name, location, tier, power_capacity_kw, cooling_capacity_kw,
                max_racks, status, monthly_operating_cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *, 0::bigint AS rack_count, 0::float8 AS power_used_kw
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(&request.name)
        .bind(&request.location)
        .bind(request.tier)
        .bind(request.power_capacity_kw)
        .bind(request.cooling_capacity_kw)
        .bind(request.max_racks)
        .bind(request.status)
        .bind(request.monthly_operating_cost)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(datacenter)
    }

    #[instrument(skip(self), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let query = format!("{SELECT_DATACENTER} WHERE d.id = $1");
        let datacenter = sqlx::query_as::<_, DatacenterDBResponse>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(datacenter)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let query = format!("{SELECT_DATACENTER} WHERE d.id = ANY($1)");
        let datacenters = sqlx::query_as::<_, DatacenterDBResponse>(&query)
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(datacenters.into_iter().map(|d| (d.id, d)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!(
            "{SELECT_DATACENTER} WHERE ($1::uuid IS NULL OR d.owner_id = $1) ORDER BY d.created_at ASC, d.id ASC OFFSET $2 LIMIT $3"
        );
        let datacenters = sqlx::query_as::<_, DatacenterDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(datacenters)
    }

    /// Fails with a foreign key violation while racks remain
    #[instrument(skip(self), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM datacenters WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(datacenter_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        sqlx::query(
            r#"
            UPDATE datacenters SET
                name = COALESCE($2, name),
                location = COALESCE($3, location),
                tier = COALESCE($4, tier),
                power_capacity_kw = COALESCE($5, power_capacity_kw),
                cooling_capacity_kw = COALESCE($6, cooling_capacity_kw),
                max_racks = COALESCE($7, max_racks),
                status = COALESCE($8, status),
                monthly_operating_cost = COALESCE($9, monthly_operating_cost),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.location)
        .bind(request.tier)
        .bind(request.power_capacity_kw)
        .bind(request.cooling_capacity_kw)
        .bind(request.max_racks)
        .bind(request.status)
        .bind(request.monthly_operating_cost)
        .execute(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}
