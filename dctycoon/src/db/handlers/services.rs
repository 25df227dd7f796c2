use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::services::{ServiceCreateDBRequest, ServiceDBResponse, ServiceStatus, ServiceUpdateDBRequest},
};
use crate::types::{DatacenterId, ServiceId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter options for listing services
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub owner_id: Option<UserId>,
    pub datacenter_id: Option<DatacenterId>,
    pub skip: i64,
    pub limit: i64,
}

const FILTER_CLAUSE: &str = "WHERE ($1::uuid IS NULL OR owner_id = $1) AND ($2::uuid IS NULL OR datacenter_id = $2)";

pub struct Services<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Services<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ServiceFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM services {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.owner_id)
            .bind(filter.datacenter_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn list_for_owner(&mut self, owner_id: UserId) -> Result<Vec<ServiceDBResponse>> {
        let services = sqlx::query_as::<_, ServiceDBResponse>("SELECT * FROM services WHERE owner_id = $1 ORDER BY created_at ASC, id ASC")
            .bind(owner_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(services)
    }

    /// Write back uptime and status computed by the security tick
    #[instrument(skip(self), fields(service_id = %abbrev_uuid(&id)), err)]
    pub async fn update_metrics(&mut self, id: ServiceId, uptime_percent: f64, status: ServiceStatus) -> Result<()> {
        sqlx::query("UPDATE services SET uptime_percent = $2, status = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(uptime_percent)
            .bind(status)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Services<'c> {
    type CreateRequest = ServiceCreateDBRequest;
    type UpdateRequest = ServiceUpdateDBRequest;
    type Response = ServiceDBResponse;
    type Id = ServiceId;
    type Filter = ServiceFilter;

    #[instrument(skip(self, request), fields(name = %request.name, datacenter_id = %abbrev_uuid(&request.datacenter_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let service = sqlx::query_as::<_, ServiceDBResponse>(
            r#"
            INSERT INTO services (id, owner_id, datacenter_id, name, service_type, monthly_price,
                uptime_percent, avg_latency_ms, throughput_mbps, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.datacenter_id)
        .bind(&request.name)
        .bind(request.service_type)
        .bind(request.monthly_price)
        .bind(request.uptime_percent)
        .bind(request.avg_latency_ms)
        .bind(request.throughput_mbps)
        .bind(request.status)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(service)
    }

    #[instrument(skip(self), fields(service_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let service = sqlx::query_as::<_, ServiceDBResponse>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(service)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let services = sqlx::query_as::<_, ServiceDBResponse>("SELECT * FROM services WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(services.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!("SELECT * FROM services {FILTER_CLAUSE} ORDER BY created_at ASC, id ASC OFFSET $3 LIMIT $4");
        let services = sqlx::query_as::<_, ServiceDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.datacenter_id)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(services)
    }

    #[instrument(skip(self), fields(service_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(service_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let service = sqlx::query_as::<_, ServiceDBResponse>(
            r#"
            UPDATE services SET
                name = COALESCE($2, name),
                service_type = COALESCE($3, service_type),
                monthly_price = COALESCE($4, monthly_price),
                uptime_percent = COALESCE($5, uptime_percent),
                avg_latency_ms = COALESCE($6, avg_latency_ms),
                throughput_mbps = COALESCE($7, throughput_mbps),
                status = COALESCE($8, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.service_type)
        .bind(request.monthly_price)
        .bind(request.uptime_percent)
        .bind(request.avg_latency_ms)
        .bind(request.throughput_mbps)
        .bind(request.status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(service)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::handlers::{Datacenters, datacenters::tests::new_datacenter};
    use crate::db::models::services::ServiceType;
    use crate::test_utils::create_test_user;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    pub(crate) fn new_service(owner_id: UserId, datacenter_id: DatacenterId) -> ServiceCreateDBRequest {
        ServiceCreateDBRequest {
            owner_id,
            datacenter_id,
            name: "shop-frontend".to_string(),
            service_type: ServiceType::WebHosting,
            monthly_price: Decimal::new(1_200, 0),
            uptime_percent: 100.0,
            avg_latency_ms: 25.0,
            throughput_mbps: 800.0,
            status: ServiceStatus::Running,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_metrics(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();

        let mut services = Services::new(&mut conn);
        let svc = services.create(&new_service(user.id, dc.id)).await.unwrap();
        services.update_metrics(svc.id, 98.5, ServiceStatus::Degraded).await.unwrap();

        let svc = services.get_by_id(svc.id).await.unwrap().unwrap();
        assert_eq!(svc.uptime_percent, 98.5);
        assert_eq!(svc.status, ServiceStatus::Degraded);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_uptime_bounds_are_checked(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();

        let mut request = new_service(user.id, dc.id);
        request.uptime_percent = 100.5;
        let result = Services::new(&mut conn).create(&request).await;
        assert!(matches!(result, Err(DbError::CheckViolation { .. })));
    }
}
