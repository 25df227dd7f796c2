use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::load_balancers::{LoadBalancerCreateDBRequest, LoadBalancerDBResponse, LoadBalancerStatus, LoadBalancerUpdateDBRequest},
};
use crate::types::{DatacenterId, LoadBalancerId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter options for listing load balancers
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerFilter {
    pub owner_id: Option<UserId>,
    pub datacenter_id: Option<DatacenterId>,
    pub skip: i64,
    pub limit: i64,
}

const FILTER_CLAUSE: &str = "WHERE ($1::uuid IS NULL OR owner_id = $1) AND ($2::uuid IS NULL OR datacenter_id = $2)";

pub struct LoadBalancers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> LoadBalancers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &LoadBalancerFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM load_balancers {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.owner_id)
            .bind(filter.datacenter_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn list_for_owner(&mut self, owner_id: UserId) -> Result<Vec<LoadBalancerDBResponse>> {
        let balancers = sqlx::query_as::<_, LoadBalancerDBResponse>(
            "SELECT * FROM load_balancers WHERE owner_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(balancers)
    }

    /// Store a status derived by the security tick
    #[instrument(skip(self), fields(load_balancer_id = %abbrev_uuid(&id)), err)]
    pub async fn set_status(&mut self, id: LoadBalancerId, status: LoadBalancerStatus) -> Result<()> {
        sqlx::query("UPDATE load_balancers SET status = $2, updated_at = NOW() WHERE id = $1 AND status <> $2")
            .bind(id)
            .bind(status)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for LoadBalancers<'c> {
    type CreateRequest = LoadBalancerCreateDBRequest;
    type UpdateRequest = LoadBalancerUpdateDBRequest;
    type Response = LoadBalancerDBResponse;
    type Id = LoadBalancerId;
    type Filter = LoadBalancerFilter;

    #[instrument(skip(self, request), fields(name = %request.name, datacenter_id = %abbrev_uuid(&request.datacenter_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let balancer = sqlx::query_as::<_, LoadBalancerDBResponse>(
            r#"
            INSERT INTO load_balancers (id, owner_id, datacenter_id, name, algorithm, health_check_enabled,
                health_check_interval_seconds, ssl_enabled, ddos_protection, max_connections,
                current_connections, backend_count, healthy_backends)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.datacenter_id)
        .bind(&request.name)
        .bind(request.algorithm)
        .bind(request.health_check_enabled)
        .bind(request.health_check_interval_seconds)
        .bind(request.ssl_enabled)
        .bind(request.ddos_protection)
        .bind(request.max_connections)
        .bind(request.current_connections)
        .bind(request.backend_count)
        .bind(request.healthy_backends)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(balancer)
    }

    #[instrument(skip(self), fields(load_balancer_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let balancer = sqlx::query_as::<_, LoadBalancerDBResponse>("SELECT * FROM load_balancers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(balancer)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let balancers = sqlx::query_as::<_, LoadBalancerDBResponse>("SELECT * FROM load_balancers WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(balancers.into_iter().map(|b| (b.id, b)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!("SELECT * FROM load_balancers {FILTER_CLAUSE} ORDER BY created_at ASC, id ASC OFFSET $3 LIMIT $4");
        let balancers = sqlx::query_as::<_, LoadBalancerDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.datacenter_id)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(balancers)
    }

    #[instrument(skip(self), fields(load_balancer_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM load_balancers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(load_balancer_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let balancer = sqlx::query_as::<_, LoadBalancerDBResponse>(
            r#"
            UPDATE load_balancers SET
                name = COALESCE($2, name),
                algorithm = COALESCE($3, algorithm),
                health_check_enabled = COALESCE($4, health_check_enabled),
                health_check_interval_seconds = COALESCE($5, health_check_interval_seconds),
                ssl_enabled = COALESCE($6, ssl_enabled),
                ddos_protection = COALESCE($7, ddos_protection),
                max_connections = COALESCE($8, max_connections),
                current_connections = COALESCE($9, current_connections),
                backend_count = COALESCE($10, backend_count),
                healthy_backends = COALESCE($11, healthy_backends),
                status = COALESCE($12, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.algorithm)
        .bind(request.health_check_enabled)
        .bind(request.health_check_interval_seconds)
        .bind(request.ssl_enabled)
        .bind(request.ddos_protection)
        .bind(request.max_connections)
        .bind(request.current_connections)
        .bind(request.backend_count)
        .bind(request.healthy_backends)
        .bind(request.status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(balancer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::handlers::{Datacenters, datacenters::tests::new_datacenter};
    use crate::db::models::load_balancers::Algorithm;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    pub(crate) fn new_balancer(owner_id: UserId, datacenter_id: DatacenterId) -> LoadBalancerCreateDBRequest {
        LoadBalancerCreateDBRequest {
            owner_id,
            datacenter_id,
            name: "edge".to_string(),
            algorithm: Algorithm::LeastConnections,
            health_check_enabled: true,
            health_check_interval_seconds: 10,
            ssl_enabled: true,
            ddos_protection: false,
            max_connections: 1000,
            current_connections: 100,
            backend_count: 4,
            healthy_backends: 4,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthy_backends_cannot_exceed_backends(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();

        let mut balancers = LoadBalancers::new(&mut conn);
        let lb = balancers.create(&new_balancer(user.id, dc.id)).await.unwrap();
        assert_eq!(lb.status, LoadBalancerStatus::Active);

        let result = balancers
            .update(
                lb.id,
                &LoadBalancerUpdateDBRequest {
                    healthy_backends: Some(5),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::CheckViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_status(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();

        let mut balancers = LoadBalancers::new(&mut conn);
        let lb = balancers.create(&new_balancer(user.id, dc.id)).await.unwrap();
        balancers.set_status(lb.id, LoadBalancerStatus::Down).await.unwrap();

        let lb = balancers.get_by_id(lb.id).await.unwrap().unwrap();
        assert_eq!(lb.status, LoadBalancerStatus::Down);
        assert_eq!(balancers.list_for_owner(user.id).await.unwrap().len(), 1);
    }
}
