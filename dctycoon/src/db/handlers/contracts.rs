use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::contracts::{
        ContractCreateDBRequest, ContractDBResponse, ContractEvaluationDBRequest, ContractStatus, ContractUpdateDBRequest,
    },
};
use crate::types::{ContractId, ServiceId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter options for listing contracts
#[derive(Debug, Clone, Default)]
pub struct ContractFilter {
    pub owner_id: Option<UserId>,
    pub service_id: Option<ServiceId>,
    pub status: Option<ContractStatus>,
    pub skip: i64,
    pub limit: i64,
}

const FILTER_CLAUSE: &str =
    "WHERE ($1::uuid IS NULL OR owner_id = $1) AND ($2::uuid IS NULL OR service_id = $2) AND ($3::text IS NULL OR status = $3)";

pub struct Contracts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Contracts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ContractFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM contracts {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.owner_id)
            .bind(filter.service_id)
            .bind(filter.status)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// A player's contracts that can still change state, locked until the caller's transaction ends
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn list_open_for_owner(&mut self, owner_id: UserId) -> Result<Vec<ContractDBResponse>> {
        let contracts = sqlx::query_as::<_, ContractDBResponse>(
            r#"
            SELECT * FROM contracts
            WHERE owner_id = $1 AND status IN ('active', 'breached')
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(owner_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(contracts)
    }

    /// Write back an evaluation made against a contract read with status `read_status`.
    ///
    /// Returns `None` when the status moved on since that read, in which case nothing is written.
    #[instrument(skip(self, evaluation), fields(contract_id = %abbrev_uuid(&id), status = ?evaluation.status), err)]
    pub async fn apply_evaluation(
        &mut self,
        id: ContractId,
        read_status: ContractStatus,
        evaluation: &ContractEvaluationDBRequest,
    ) -> Result<Option<ContractDBResponse>> {
        let contract = sqlx::query_as::<_, ContractDBResponse>(
            r#"
            UPDATE contracts SET
                status = $2,
                breach_count = $3,
                total_penalties = $4,
                last_evaluated_at = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = $6
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(evaluation.status)
        .bind(evaluation.breach_count)
        .bind(evaluation.total_penalties)
        .bind(evaluation.evaluated_at)
        .bind(read_status)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(contract)
    }

    /// End an open contract. `None` if it is missing or already ended.
    #[instrument(skip(self), fields(contract_id = %abbrev_uuid(&id)), err)]
    pub async fn terminate(&mut self, id: ContractId) -> Result<Option<ContractDBResponse>> {
        let contract = sqlx::query_as::<_, ContractDBResponse>(
            r#"
            UPDATE contracts SET status = 'terminated', updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'breached')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(contract)
    }

    #[cfg(test)]
    pub async fn set_status(&mut self, id: ContractId, status: ContractStatus) -> Result<ContractDBResponse> {
        let contract = sqlx::query_as::<_, ContractDBResponse>(
            "UPDATE contracts SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(contract)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Contracts<'c> {
    type CreateRequest = ContractCreateDBRequest;
    type UpdateRequest = ContractUpdateDBRequest;
    type Response = ContractDBResponse;
    type Id = ContractId;
    type Filter = ContractFilter;

    #[instrument(skip(self, request), fields(client = %request.client_name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let contract = sqlx::query_as::<_, ContractDBResponse>(
            r#"
            INSERT INTO contracts (id, owner_id, service_id, client_name, monthly_value, guaranteed_uptime_percent,
                max_latency_ms, min_throughput_mbps, penalty_rate_percent, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.service_id)
        .bind(&request.client_name)
        .bind(request.monthly_value)
        .bind(request.guaranteed_uptime_percent)
        .bind(request.max_latency_ms)
        .bind(request.min_throughput_mbps)
        .bind(request.penalty_rate_percent)
        .bind(request.start_date)
        .bind(request.end_date)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(contract)
    }

    #[instrument(skip(self), fields(contract_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let contract = sqlx::query_as::<_, ContractDBResponse>("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(contract)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let contracts = sqlx::query_as::<_, ContractDBResponse>("SELECT * FROM contracts WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(contracts.into_iter().map(|c| (c.id, c)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!("SELECT * FROM contracts {FILTER_CLAUSE} ORDER BY created_at DESC, id DESC OFFSET $4 LIMIT $5");
        let contracts = sqlx::query_as::<_, ContractDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.service_id)
            .bind(filter.status)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(contracts)
    }

    #[instrument(skip(self), fields(contract_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contracts WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(contract_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let (replace_service, service_id) = match request.service_id {
            Some(service_id) => (true, service_id),
            None => (false, None),
        };

        let contract = sqlx::query_as::<_, ContractDBResponse>(
            r#"
            UPDATE contracts SET
                service_id = CASE WHEN $2 THEN $3 ELSE service_id END,
                client_name = COALESCE($4, client_name),
                monthly_value = COALESCE($5, monthly_value),
                guaranteed_uptime_percent = COALESCE($6, guaranteed_uptime_percent),
                max_latency_ms = COALESCE($7, max_latency_ms),
                min_throughput_mbps = COALESCE($8, min_throughput_mbps),
                penalty_rate_percent = COALESCE($9, penalty_rate_percent),
                end_date = COALESCE($10, end_date),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(replace_service)
        .bind(service_id)
        .bind(&request.client_name)
        .bind(request.monthly_value)
        .bind(request.guaranteed_uptime_percent)
        .bind(request.max_latency_ms)
        .bind(request.min_throughput_mbps)
        .bind(request.penalty_rate_percent)
        .bind(request.end_date)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(contract)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::handlers::{Datacenters, Services, datacenters::tests::new_datacenter, services::tests::new_service};
    use crate::test_utils::create_test_user;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    pub(crate) fn new_contract(owner_id: UserId, service_id: Option<ServiceId>) -> ContractCreateDBRequest {
        let now = Utc::now();
        ContractCreateDBRequest {
            owner_id,
            service_id,
            client_name: "Globex".to_string(),
            monthly_value: Decimal::new(2_000, 0),
            guaranteed_uptime_percent: 99.5,
            max_latency_ms: 100.0,
            min_throughput_mbps: 100.0,
            penalty_rate_percent: Decimal::new(5, 0),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(365),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_end_must_follow_start(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();

        let mut request = new_contract(user.id, None);
        request.end_date = request.start_date;
        let result = Contracts::new(&mut conn).create(&request).await;
        assert!(matches!(result, Err(DbError::CheckViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_service_delete_unlinks_contract(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "ams-1")).await.unwrap();
        let svc = Services::new(&mut conn).create(&new_service(user.id, dc.id)).await.unwrap();

        let contract = Contracts::new(&mut conn).create(&new_contract(user.id, Some(svc.id))).await.unwrap();
        assert_eq!(contract.status, ContractStatus::Active);
        assert_eq!(contract.breach_count, 0);

        assert!(Services::new(&mut conn).delete(svc.id).await.unwrap());
        let contract = Contracts::new(&mut conn).get_by_id(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.service_id, None);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_evaluation_and_open_listing(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut contracts = Contracts::new(&mut conn);

        let a = contracts.create(&new_contract(user.id, None)).await.unwrap();
        let b = contracts.create(&new_contract(user.id, None)).await.unwrap();

        let evaluation = ContractEvaluationDBRequest {
            status: ContractStatus::Breached,
            breach_count: 1,
            total_penalties: Decimal::new(100, 0),
            evaluated_at: Utc::now(),
        };
        let breached = contracts
            .apply_evaluation(a.id, ContractStatus::Active, &evaluation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(breached.status, ContractStatus::Breached);
        assert_eq!(breached.total_penalties, Decimal::new(100, 0));
        assert!(breached.last_evaluated_at.is_some());

        // Evaluated against a status that is no longer current: no write
        assert!(contracts.apply_evaluation(a.id, ContractStatus::Active, &evaluation).await.unwrap().is_none());

        let terminated = contracts.terminate(b.id).await.unwrap().unwrap();
        assert_eq!(terminated.status, ContractStatus::Terminated);
        assert!(contracts.terminate(b.id).await.unwrap().is_none());
        assert!(
            contracts
                .apply_evaluation(b.id, ContractStatus::Active, &evaluation)
                .await
                .unwrap()
                .is_none()
        );

        let open = contracts.list_open_for_owner(user.id).await.unwrap();
        assert_eq!(open.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id]);

        let filter = ContractFilter {
            status: Some(ContractStatus::Terminated),
            limit: 10,
            ..Default::default()
        };
        assert_eq!(contracts.count(&filter).await.unwrap(), 1);
    }
}
