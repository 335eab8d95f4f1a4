//! Profile repository: identity and push token lookup.

use async_trait::async_trait;
use domain::models::Profile;
use domain::services::ProfileDirectory;
use domain::EngineError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::ProfileEntity;
use crate::error::storage_error;
use crate::metrics::QueryTimer;

/// Repository for profile database operations.
#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    /// Creates a new ProfileRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores or replaces the push token of a profile.
    pub async fn update_push_token(
        &self,
        id: Uuid,
        push_token: Option<&str>,
    ) -> Result<bool, EngineError> {
        let timer = QueryTimer::new("update_profile_push_token");
        let result = sqlx::query("UPDATE profiles SET push_token = $2 WHERE id = $1")
            .bind(id)
            .bind(push_token)
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(storage_error)?.rows_affected() > 0)
    }
}

#[async_trait]
impl ProfileDirectory for ProfileRepository {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, EngineError> {
        let timer = QueryTimer::new("find_profile_by_id");
        let result = sqlx::query_as::<_, ProfileEntity>(
            "SELECT id, username, full_name, push_token FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(storage_error)?.map(Profile::from))
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, EngineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let timer = QueryTimer::new("find_profiles_by_ids");
        let result = sqlx::query_as::<_, ProfileEntity>(
            "SELECT id, username, full_name, push_token FROM profiles WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(Profile::from)
            .collect())
    }
}
