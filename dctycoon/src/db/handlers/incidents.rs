use crate::db::{
    errors::{DbError, Result},
    models::incidents::{IncidentCreateDBRequest, IncidentDBResponse, IncidentKind},
};
use crate::types::{DatacenterId, IncidentId, UserId, abbrev_uuid};
use sqlx::{FromRow, PgConnection};
use std::collections::HashSet;
use tracing::instrument;
use uuid::Uuid;

/// Filter options for listing incidents
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub owner_id: Option<UserId>,
    pub resolved: Option<bool>,
    pub skip: i64,
    pub limit: i64,
}

const FILTER_CLAUSE: &str = "WHERE ($1::uuid IS NULL OR owner_id = $1) AND ($2::bool IS NULL OR resolved = $2)";

#[derive(FromRow)]
struct OpenKey {
    source_id: Uuid,
    kind: IncidentKind,
}

pub struct Incidents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Incidents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Open an incident. Returns `None` when the same source already has an open incident of that kind.
    #[instrument(skip(self, request), fields(source_id = %abbrev_uuid(&request.source_id), kind = ?request.kind), err)]
    pub async fn create(&mut self, request: &IncidentCreateDBRequest) -> Result<Option<IncidentDBResponse>> {
        let incident = sqlx::query_as::<_, IncidentDBResponse>(
            r#"
            INSERT INTO incidents (id, owner_id, datacenter_id, source_type, source_id, kind, severity, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_id, kind) WHERE NOT resolved DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.datacenter_id)
        .bind(request.source_type)
        .bind(request.source_id)
        .bind(request.kind)
        .bind(request.severity)
        .bind(&request.description)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(incident)
    }

    #[instrument(skip(self), fields(incident_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: IncidentId) -> Result<Option<IncidentDBResponse>> {
        let incident = sqlx::query_as::<_, IncidentDBResponse>("SELECT * FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(incident)
    }

    /// Newest first
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &IncidentFilter) -> Result<Vec<IncidentDBResponse>> {
        let query = format!("SELECT * FROM incidents {FILTER_CLAUSE} ORDER BY created_at DESC, id DESC OFFSET $3 LIMIT $4");
        let incidents = sqlx::query_as::<_, IncidentDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.resolved)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(incidents)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &IncidentFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM incidents {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.owner_id)
            .bind(filter.resolved)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Mark resolved. Resolving an already resolved incident keeps the original timestamp.
    #[instrument(skip(self), fields(incident_id = %abbrev_uuid(&id)), err)]
    pub async fn resolve(&mut self, id: IncidentId) -> Result<IncidentDBResponse> {
        let incident = sqlx::query_as::<_, IncidentDBResponse>(
            r#"
            UPDATE incidents SET resolved = TRUE, resolved_at = COALESCE(resolved_at, NOW())
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(incident)
    }

    /// `(source_id, kind)` of every unresolved incident a player has
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn open_keys(&mut self, owner_id: UserId) -> Result<HashSet<(Uuid, IncidentKind)>> {
        let keys = sqlx::query_as::<_, OpenKey>("SELECT source_id, kind FROM incidents WHERE owner_id = $1 AND NOT resolved")
            .bind(owner_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(keys.into_iter().map(|k| (k.source_id, k.kind)).collect())
    }

    /// Datacenters with at least one unresolved incident
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn open_datacenters(&mut self, owner_id: UserId) -> Result<HashSet<DatacenterId>> {
        let ids = sqlx::query_scalar::<_, DatacenterId>(
            "SELECT DISTINCT datacenter_id FROM incidents WHERE owner_id = $1 AND NOT resolved",
        )
        .bind(owner_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(ids.into_iter().collect())
    }
}
