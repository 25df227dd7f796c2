use crate::db::{
    errors::Result,
    models::security_scores::{SecurityScoreCreateDBRequest, SecurityScoreDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct SecurityScores<'c> {
    db: &'c mut PgConnection,
}

impl<'c> SecurityScores<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), overall = request.overall_score), err)]
    pub async fn create(&mut self, request: &SecurityScoreCreateDBRequest) -> Result<SecurityScoreDBResponse> {
        let score = sqlx::query_as::<_, SecurityScoreDBResponse>(
            r#"
            INSERT INTO security_scores (user_id, firewall_score, load_balancer_score, overall_score, open_incidents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(request.firewall_score)
        .bind(request.load_balancer_score)
        .bind(request.overall_score)
        .bind(request.open_incidents)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(score)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn latest(&mut self, user_id: UserId) -> Result<Option<SecurityScoreDBResponse>> {
        let score = sqlx::query_as::<_, SecurityScoreDBResponse>(
            "SELECT * FROM security_scores WHERE user_id = $1 ORDER BY computed_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(score)
    }

    /// Snapshot history, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<SecurityScoreDBResponse>> {
        let scores = sqlx::query_as::<_, SecurityScoreDBResponse>(
            "SELECT * FROM security_scores WHERE user_id = $1 ORDER BY computed_at DESC, id DESC OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(scores)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM security_scores WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_latest_is_newest_snapshot(pool: PgPool) {
        let user = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut scores = SecurityScores::new(&mut conn);

        assert!(scores.latest(user.id).await.unwrap().is_none());

        for overall in [40.0, 55.5] {
            scores
                .create(&SecurityScoreCreateDBRequest {
                    user_id: user.id,
                    firewall_score: overall,
                    load_balancer_score: 0.0,
                    overall_score: overall,
                    open_incidents: 1,
                })
                .await
                .unwrap();
        }

        assert_eq!(scores.latest(user.id).await.unwrap().unwrap().overall_score, 55.5);
        assert_eq!(scores.count(user.id).await.unwrap(), 2);
        assert_eq!(scores.list(user.id, 1, 10).await.unwrap()[0].overall_score, 40.0);
    }
}
