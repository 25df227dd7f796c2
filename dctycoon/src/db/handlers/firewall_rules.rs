use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::firewall_rules::{FirewallRuleCreateDBRequest, FirewallRuleDBResponse, FirewallRuleUpdateDBRequest},
};
use crate::types::{DatacenterId, FirewallRuleId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter options for listing firewall rules
#[derive(Debug, Clone, Default)]
pub struct FirewallRuleFilter {
    pub owner_id: Option<UserId>,
    pub datacenter_id: Option<DatacenterId>,
    pub skip: i64,
    pub limit: i64,
}

const FILTER_CLAUSE: &str = "WHERE ($1::uuid IS NULL OR owner_id = $1) AND ($2::uuid IS NULL OR datacenter_id = $2)";

pub struct FirewallRules<'c> {
    db: &'c mut PgConnection,
}

impl<'c> FirewallRules<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &FirewallRuleFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM firewall_rules {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.owner_id)
            .bind(filter.datacenter_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// All of a player's rules in evaluation order
    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id)), err)]
    pub async fn list_for_owner(&mut self, owner_id: UserId) -> Result<Vec<FirewallRuleDBResponse>> {
        let rules = sqlx::query_as::<_, FirewallRuleDBResponse>(
            "SELECT * FROM firewall_rules WHERE owner_id = $1 ORDER BY priority ASC, created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rules)
    }

    #[instrument(skip(self), fields(rule_id = %abbrev_uuid(&id)), err)]
    pub async fn toggle(&mut self, id: FirewallRuleId) -> Result<FirewallRuleDBResponse> {
        let rule = sqlx::query_as::<_, FirewallRuleDBResponse>(
            "UPDATE firewall_rules SET enabled = NOT enabled, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(rule)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for FirewallRules<'c> {
    type CreateRequest = FirewallRuleCreateDBRequest;
    type UpdateRequest = FirewallRuleUpdateDBRequest;
    type Response = FirewallRuleDBResponse;
    type Id = FirewallRuleId;
    type Filter = FirewallRuleFilter;

    #[instrument(skip(self, request), fields(name = %request.name, datacenter_id = %abbrev_uuid(&request.datacenter_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let rule = sqlx::query_as::<_, FirewallRuleDBResponse>(
            r#"
            INSERT INTO firewall_rules (id, owner_id, datacenter_id, name, action, direction, protocol,
                source_cidr, destination_cidr, port_start, port_end, priority, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.datacenter_id)
        .bind(&request.name)
        .bind(request.action)
        .bind(request.direction)
        .bind(request.protocol)
        .bind(&request.source_cidr)
        .bind(&request.destination_cidr)
        .bind(request.port_start)
        .bind(request.port_end)
        .bind(request.priority)
        .bind(request.enabled)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(rule)
    }

    #[instrument(skip(self), fields(rule_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let rule = sqlx::query_as::<_, FirewallRuleDBResponse>("SELECT * FROM firewall_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(rule)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let rules = sqlx::query_as::<_, FirewallRuleDBResponse>("SELECT * FROM firewall_rules WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rules.into_iter().map(|r| (r.id, r)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!("SELECT * FROM firewall_rules {FILTER_CLAUSE} ORDER BY priority ASC, created_at ASC, id ASC OFFSET $3 LIMIT $4");
        let rules = sqlx::query_as::<_, FirewallRuleDBResponse>(&query)
            .bind(filter.owner_id)
            .bind(filter.datacenter_id)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rules)
    }

    #[instrument(skip(self), fields(rule_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM firewall_rules WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(rule_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let (replace_ports, (port_start, port_end)) = match request.ports {
            Some(Some((start, end))) => (true, (Some(start), Some(end))),
            Some(None) => (true, (None, None)),
            None => (false, (None, None)),
        };

        let rule = sqlx::query_as::<_, FirewallRuleDBResponse>(
            r#"
            UPDATE firewall_rules SET
                name = COALESCE($2, name),
                action = COALESCE($3, action),
                direction = COALESCE($4, direction),
                protocol = COALESCE($5, protocol),
                source_cidr = COALESCE($6, source_cidr),
                destination_cidr = COALESCE($7, destination_cidr),
                port_start = CASE WHEN $8 THEN $9 ELSE port_start END,
                port_end = CASE WHEN $8 THEN $10 ELSE port_end END,
                priority = COALESCE($11, priority),
                enabled = COALESCE($12, enabled),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.action)
        .bind(request.direction)
        .bind(request.protocol)
        .bind(&request.source_cidr)
        .bind(&request.destination_cidr)
        .bind(replace_ports)
        .bind(port_start)
        .bind(port_end)
        .bind(request.priority)
        .bind(request.enabled)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(rule)
    }
}
