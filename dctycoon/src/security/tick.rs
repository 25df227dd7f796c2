//! One sweep of the security simulation over every active player.
//!
//! ```text
//! run_once()
//!   ├─ DB: Users::list_active_ids()
//!   └─ for each player, in its own transaction:
//!        ├─ pg_advisory_xact_lock(player)     → overlapping sweeps of one player run one after the other
//!        ├─ load datacenters, rules, balancers, services, open contracts, open incidents
//!        ├─ derive balancer status            → LoadBalancers::set_status()
//!        ├─ plan_incidents()                  → Incidents::create()   (ON CONFLICT DO NOTHING)
//!        ├─ next_service_metrics()            → Services::update_metrics()
//!        ├─ sla::evaluate()                   → Contracts::apply_evaluation() then Wallet::record(sla_penalty)
//!        ├─ compute_scores()                  → SecurityScores::create()
//!        └─ commit
//! ```
//!
//! A player whose sweep fails is rolled back, logged and counted. The others carry on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use crate::{
    config::SecurityTickConfig,
    db::{
        errors::Result,
        handlers::{
            Contracts, Datacenters, FirewallRules, Incidents, LoadBalancers, SecurityScores, Services, Users, Wallet,
            incidents::IncidentFilter,
        },
        models::{
            contracts::ContractEvaluationDBRequest,
            security_scores::SecurityScoreCreateDBRequest,
            wallet::{TransactionType, WalletTransactionCreateDBRequest},
        },
    },
    security::{
        incidents::{PlanningInput, derive_load_balancer_status, next_service_metrics, plan_incidents},
        scoring::compute_scores,
        sla::{self, SlaTransition},
    },
    types::{UserId, abbrev_uuid},
};

/// First key of the two-key advisory lock taken per player sweep
const SWEEP_LOCK_CLASS: i32 = 0x7469_636b;

/// Totals for one sweep
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TickReport {
    pub users_processed: u32,
    pub users_failed: u32,
    pub incidents_created: u32,
    pub contracts_breached: u32,
    pub contracts_recovered: u32,
    pub contracts_expired: u32,
    #[schema(value_type = f64)]
    pub penalties_charged: Decimal,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// What a single player's sweep changed
#[derive(Debug, Default)]
struct UserOutcome {
    incidents_created: u32,
    contracts_breached: u32,
    contracts_recovered: u32,
    contracts_expired: u32,
    penalties_charged: Decimal,
}

#[derive(Clone)]
pub struct SecurityTick {
    pool: PgPool,
    config: SecurityTickConfig,
}

impl SecurityTick {
    pub fn new(pool: PgPool, config: SecurityTickConfig) -> Self {
        Self { pool, config }
    }

    /// Sweep every active player once.
    ///
    /// Only listing the players can fail the whole sweep.
    #[instrument(skip(self), err)]
    pub async fn run_once(&self) -> anyhow::Result<TickReport> {
        let started_at = Utc::now();
        let user_ids = {
            let mut conn = self.pool.acquire().await?;
            Users::new(&mut conn).list_active_ids().await?
        };

        let mut report = TickReport {
            users_processed: 0,
            users_failed: 0,
            incidents_created: 0,
            contracts_breached: 0,
            contracts_recovered: 0,
            contracts_expired: 0,
            penalties_charged: Decimal::ZERO,
            started_at,
            finished_at: started_at,
        };

        for user_id in user_ids {
            match self.run_for_user(user_id, started_at).await {
                Ok(outcome) => {
                    report.users_processed += 1;
                    report.incidents_created += outcome.incidents_created;
                    report.contracts_breached += outcome.contracts_breached;
                    report.contracts_recovered += outcome.contracts_recovered;
                    report.contracts_expired += outcome.contracts_expired;
                    report.penalties_charged += outcome.penalties_charged;
                }
                Err(e) => {
                    error!(user_id = %abbrev_uuid(&user_id), "Security tick failed for user: {:#}", e);
                    report.users_failed += 1;
                }
            }
        }

        report.finished_at = Utc::now();

        counter!("dctycoon_security_ticks_total").increment(1);
        counter!("dctycoon_security_tick_user_failures_total").increment(report.users_failed.into());
        counter!("dctycoon_incidents_created_total").increment(report.incidents_created.into());
        counter!("dctycoon_sla_breaches_total").increment(report.contracts_breached.into());

        info!(
            users = report.users_processed,
            failed = report.users_failed,
            incidents = report.incidents_created,
            breached = report.contracts_breached,
            penalties = %report.penalties_charged,
            "Security tick complete"
        );

        Ok(report)
    }

    async fn run_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<UserOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.sweep_user(&mut tx, user_id, now).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    #[instrument(skip(self, conn, now), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn sweep_user(&self, conn: &mut PgConnection, user_id: UserId, now: DateTime<Utc>) -> Result<UserOutcome> {
        let mut outcome = UserOutcome::default();

        // Held until commit or rollback. Everything below reads what the previous sweep committed.
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2::text))")
            .bind(SWEEP_LOCK_CLASS)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        let datacenters = Datacenters::new(&mut *conn).list_for_owner(user_id).await?;
        let rules = FirewallRules::new(&mut *conn).list_for_owner(user_id).await?;
        let mut balancers = LoadBalancers::new(&mut *conn).list_for_owner(user_id).await?;
        let services = Services::new(&mut *conn).list_for_owner(user_id).await?;
        let contracts = Contracts::new(&mut *conn).list_open_for_owner(user_id).await?;
        let open = Incidents::new(&mut *conn).open_keys(user_id).await?;

        for lb in balancers.iter_mut() {
            let status = derive_load_balancer_status(lb);
            if status != lb.status {
                LoadBalancers::new(&mut *conn).set_status(lb.id, status).await?;
                lb.status = status;
            }
        }

        let planned = plan_incidents(&PlanningInput {
            owner_id: user_id,
            datacenters: &datacenters,
            rules: &rules,
            load_balancers: &balancers,
            open: &open,
        });

        let mut created = Vec::with_capacity(planned.len());
        for request in planned {
            // A concurrent sweep may have opened the same incident, the insert is then a no-op
            if Incidents::new(&mut *conn).create(&request).await?.is_some() {
                created.push(request);
            }
        }
        outcome.incidents_created = created.len() as u32;

        let noisy_datacenters = Incidents::new(&mut *conn).open_datacenters(user_id).await?;
        let mut services_by_id = HashMap::with_capacity(services.len());
        for mut service in services {
            let next = next_service_metrics(
                &service,
                &created,
                noisy_datacenters.contains(&service.datacenter_id),
                self.config.recovery_per_tick,
            );
            if next.uptime_percent != service.uptime_percent || next.status != service.status {
                Services::new(&mut *conn)
                    .update_metrics(service.id, next.uptime_percent, next.status)
                    .await?;
                service.uptime_percent = next.uptime_percent;
                service.status = next.status;
            }
            services_by_id.insert(service.id, service);
        }

        for contract in &contracts {
            let service = contract.service_id.and_then(|id| services_by_id.get(&id));
            let evaluation = sla::evaluate(contract, service, now);

            let applied = Contracts::new(&mut *conn)
                .apply_evaluation(
                    contract.id,
                    contract.status,
                    &ContractEvaluationDBRequest {
                        status: evaluation.status,
                        breach_count: evaluation.breach_count,
                        total_penalties: evaluation.total_penalties,
                        evaluated_at: now,
                    },
                )
                .await?;
            if applied.is_none() {
                debug!(contract_id = %abbrev_uuid(&contract.id), "Contract changed during sweep, evaluation dropped");
                continue;
            }

            match evaluation.transition {
                SlaTransition::Breached => {
                    outcome.contracts_breached += 1;
                    if evaluation.penalty > Decimal::ZERO {
                        Wallet::new(&mut *conn)
                            .record(&WalletTransactionCreateDBRequest {
                                user_id,
                                transaction_type: TransactionType::SlaPenalty,
                                amount: evaluation.penalty,
                                description: Some(format!("SLA penalty: {}", contract.client_name)),
                                reference_id: Some(contract.id),
                            })
                            .await?;
                        outcome.penalties_charged += evaluation.penalty;
                    }
                }
                SlaTransition::Recovered => outcome.contracts_recovered += 1,
                SlaTransition::Expired => outcome.contracts_expired += 1,
                SlaTransition::Unchanged | SlaTransition::StillBreached => {}
            }
        }

        let scores = compute_scores(&rules, &balancers, &self.config);
        let open_incidents = Incidents::new(&mut *conn)
            .count(&IncidentFilter {
                owner_id: Some(user_id),
                resolved: Some(false),
                ..Default::default()
            })
            .await?;

        SecurityScores::new(&mut *conn)
            .create(&SecurityScoreCreateDBRequest {
                user_id,
                firewall_score: scores.firewall_score,
                load_balancer_score: scores.load_balancer_score,
                overall_score: scores.overall_score,
                open_incidents: open_incidents as i32,
            })
            .await?;

        if outcome.penalties_charged > Decimal::ZERO {
            counter!("dctycoon_sla_penalties_charged_total").increment(1);
        }
        debug!(incidents = outcome.incidents_created, overall = scores.overall_score, "Swept user");

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{
        Repository, contracts::tests::new_contract, datacenters::tests::new_datacenter, firewall_rules::tests::new_rule,
        load_balancers::tests::new_balancer, services::tests::new_service,
    };
    use crate::db::models::{
        contracts::ContractStatus, firewall_rules::RuleAction, incidents::IncidentKind, load_balancers::LoadBalancerStatus,
        services::ServiceStatus,
    };
    use crate::test_utils::{create_test_user, fund_test_user};
    use sqlx::PgPool;

    fn tick(pool: &PgPool) -> SecurityTick {
        SecurityTick::new(pool.clone(), SecurityTickConfig::default())
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unprotected_datacenter_breaches_contract_once(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        fund_test_user(&pool, user.id, 1_000).await;

        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "fra-1")).await.unwrap();
        let service = Services::new(&mut conn).create(&new_service(user.id, dc.id)).await.unwrap();
        let mut contract = new_contract(user.id, Some(service.id));
        contract.guaranteed_uptime_percent = 99.5;
        let contract = Contracts::new(&mut conn).create(&contract).await.unwrap();
        drop(conn);

        // No firewall rules at all: intrusion/high costs the service a full point of uptime
        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.users_processed, 1);
        assert_eq!(report.users_failed, 0);
        assert_eq!(report.incidents_created, 1);
        assert_eq!(report.contracts_breached, 1);

        let mut conn = pool.acquire().await.unwrap();
        let service = Services::new(&mut conn).get_by_id(service.id).await.unwrap().unwrap();
        assert_eq!(service.uptime_percent, 99.0);
        assert_eq!(service.status, ServiceStatus::Running);

        let contract = Contracts::new(&mut conn).get_by_id(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Breached);
        assert_eq!(contract.breach_count, 1);
        assert!(contract.last_evaluated_at.is_some());
        let penalty = contract.total_penalties;
        assert_eq!(report.penalties_charged, penalty);

        let balance = Wallet::new(&mut conn).balance(user.id).await.unwrap();
        assert_eq!(balance, Decimal::new(1_000, 0) - penalty);
        drop(conn);

        // Second sweep: the incident is still open, so nothing new and no second charge
        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.incidents_created, 0);
        assert_eq!(report.contracts_breached, 0);
        assert_eq!(report.penalties_charged, Decimal::ZERO);

        let mut conn = pool.acquire().await.unwrap();
        let contract = Contracts::new(&mut conn).get_by_id(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.breach_count, 1);
        assert_eq!(contract.status, ContractStatus::Breached);
        assert_eq!(Wallet::new(&mut conn).balance(user.id).await.unwrap(), balance);

        let keys = Incidents::new(&mut conn).open_keys(user.id).await.unwrap();
        assert!(keys.contains(&(dc.id, IncidentKind::Intrusion)));
        assert_eq!(keys.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_penalty_may_overdraw_wallet(pool: PgPool) {
        let user = create_test_user(&pool, false).await;

        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "fra-1")).await.unwrap();
        let mut service = new_service(user.id, dc.id);
        service.avg_latency_ms = 500.0;
        let service = Services::new(&mut conn).create(&service).await.unwrap();
        Contracts::new(&mut conn).create(&new_contract(user.id, Some(service.id))).await.unwrap();
        drop(conn);

        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.contracts_breached, 1);
        assert!(report.penalties_charged > Decimal::ZERO);

        let mut conn = pool.acquire().await.unwrap();
        let balance = Wallet::new(&mut conn).balance(user.id).await.unwrap();
        assert_eq!(balance, -report.penalties_charged);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_balancer_status_and_score_snapshot(pool: PgPool) {
        let user = create_test_user(&pool, false).await;

        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user.id, "fra-1")).await.unwrap();
        let mut deny = new_rule(user.id, dc.id, "default deny", 1000);
        deny.action = RuleAction::Deny;
        deny.source_cidr = "any".to_string();
        deny.port_start = None;
        deny.port_end = None;
        FirewallRules::new(&mut conn).create(&deny).await.unwrap();

        let mut lb = new_balancer(user.id, dc.id);
        lb.backend_count = 4;
        lb.healthy_backends = 0;
        let lb = LoadBalancers::new(&mut conn).create(&lb).await.unwrap();
        drop(conn);

        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.incidents_created, 1);

        let mut conn = pool.acquire().await.unwrap();
        let lb = LoadBalancers::new(&mut conn).get_by_id(lb.id).await.unwrap().unwrap();
        assert_eq!(lb.status, LoadBalancerStatus::Down);

        let keys = Incidents::new(&mut conn).open_keys(user.id).await.unwrap();
        assert!(keys.contains(&(lb.id, IncidentKind::ServiceOutage)));

        let snapshot = SecurityScores::new(&mut conn).latest(user.id).await.unwrap().unwrap();
        assert_eq!(snapshot.open_incidents, 1);
        assert!((0.0..=100.0).contains(&snapshot.overall_score));
        assert!(snapshot.firewall_score > 0.0);
    }

    #[sqlx::test]
    async fn test_inactive_users_are_skipped(pool: PgPool) {
        let active = create_test_user(&pool, false).await;
        let inactive = create_test_user(&pool, false).await;

        let mut conn = pool.acquire().await.unwrap();
        Users::new(&mut conn)
            .update(
                inactive.id,
                &crate::db::models::users::UserUpdateDBRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        drop(conn);

        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.users_processed, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(SecurityScores::new(&mut conn).latest(active.id).await.unwrap().is_some());
        assert!(SecurityScores::new(&mut conn).latest(inactive.id).await.unwrap().is_none());
    }

    async fn breachable_contract(pool: &PgPool, user_id: UserId) -> crate::db::models::contracts::ContractDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        let dc = Datacenters::new(&mut conn).create(&new_datacenter(user_id, "fra-1")).await.unwrap();
        let service = Services::new(&mut conn).create(&new_service(user_id, dc.id)).await.unwrap();
        let mut contract = new_contract(user_id, Some(service.id));
        contract.guaranteed_uptime_percent = 99.5;
        Contracts::new(&mut conn).create(&contract).await.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_overlapping_sweeps_charge_a_breach_once(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        fund_test_user(&pool, user.id, 1_000).await;
        let contract = breachable_contract(&pool, user.id).await;

        let sweeper = tick(&pool);
        let now = Utc::now();
        let mut first = pool.begin().await.unwrap();
        let first_outcome = sweeper.sweep_user(&mut first, user.id, now).await.unwrap();
        assert_eq!(first_outcome.contracts_breached, 1);
        let penalty = first_outcome.penalties_charged;
        assert!(penalty > Decimal::ZERO);

        let user_id = user.id;
        let second = tokio::spawn({
            let sweeper = sweeper.clone();
            async move { sweeper.run_for_user(user_id, now).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!second.is_finished(), "second sweep should wait for the first to commit");

        first.commit().await.unwrap();
        let second_outcome = second.await.unwrap().unwrap();
        assert_eq!(second_outcome.contracts_breached, 0);
        assert_eq!(second_outcome.penalties_charged, Decimal::ZERO);

        let mut conn = pool.acquire().await.unwrap();
        let penalties: Vec<_> = Wallet::new(&mut conn)
            .list_transactions(user.id, 0, 100)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.transaction_type == TransactionType::SlaPenalty)
            .collect();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].reference_id, Some(contract.id));

        let contract = Contracts::new(&mut conn).get_by_id(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.breach_count, 1);
        assert_eq!(contract.total_penalties, penalty);
        assert_eq!(Wallet::new(&mut conn).balance(user.id).await.unwrap(), Decimal::new(1_000, 0) - penalty);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_terminate_during_sweep_is_kept(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        fund_test_user(&pool, user.id, 1_000).await;
        let contract = breachable_contract(&pool, user.id).await;

        let mut sweep = pool.begin().await.unwrap();
        let outcome = tick(&pool).sweep_user(&mut sweep, user.id, Utc::now()).await.unwrap();
        assert_eq!(outcome.contracts_breached, 1);

        let contract_id = contract.id;
        let terminate = tokio::spawn({
            let pool = pool.clone();
            async move {
                let mut conn = pool.acquire().await.unwrap();
                Contracts::new(&mut conn).terminate(contract_id).await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!terminate.is_finished(), "terminate should wait for the sweep's row lock");

        sweep.commit().await.unwrap();
        let terminated = terminate.await.unwrap().unwrap().unwrap();
        assert_eq!(terminated.status, ContractStatus::Terminated);

        // Later sweeps leave the ended contract alone
        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.contracts_breached, 0);

        let mut conn = pool.acquire().await.unwrap();
        let contract = Contracts::new(&mut conn).get_by_id(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Terminated);
        assert_eq!(contract.breach_count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_user_is_rolled_back_and_others_continue(pool: PgPool) {
        let healthy = create_test_user(&pool, false).await;
        let failing = create_test_user(&pool, false).await;
        fund_test_user(&pool, failing.id, 1_000).await;
        breachable_contract(&pool, healthy.id).await;
        let contract = breachable_contract(&pool, failing.id).await;

        // Make the very last write of the failing user's sweep blow up
        sqlx::query(&format!(
            r#"
            CREATE FUNCTION refuse_score_snapshot() RETURNS trigger AS $$
            BEGIN
                IF NEW.user_id = '{}' THEN
                    RAISE EXCEPTION 'snapshot refused';
                END IF;
                RETURN NEW;
            END
            $$ LANGUAGE plpgsql
            "#,
            failing.id
        ))
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE TRIGGER refuse_score_snapshot BEFORE INSERT ON security_scores FOR EACH ROW EXECUTE FUNCTION refuse_score_snapshot()")
            .execute(&pool)
            .await
            .unwrap();

        let report = tick(&pool).run_once().await.unwrap();
        assert_eq!(report.users_processed, 1);
        assert_eq!(report.users_failed, 1);
        assert_eq!(report.contracts_breached, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(SecurityScores::new(&mut conn).latest(healthy.id).await.unwrap().is_some());
        assert!(!Incidents::new(&mut conn).open_keys(healthy.id).await.unwrap().is_empty());

        // Nothing from the failed sweep survives
        assert!(SecurityScores::new(&mut conn).latest(failing.id).await.unwrap().is_none());
        assert!(Incidents::new(&mut conn).open_keys(failing.id).await.unwrap().is_empty());
        let contract = Contracts::new(&mut conn).get_by_id(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Active);
        assert_eq!(contract.breach_count, 0);
        assert!(contract.last_evaluated_at.is_none());
        assert_eq!(Wallet::new(&mut conn).balance(failing.id).await.unwrap(), Decimal::new(1_000, 0));
    }
}
