//! Arrival request repository: PostgreSQL implementation of [`RequestStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Alert, ArrivalRequest, NewAlert, NewArrivalRequest, RequestStatus};
use domain::services::RequestStore;
use domain::EngineError;
use sqlx::PgPool;
use uuid::Uuid;

use super::alert::insert_alert_with_recipients;
use crate::entities::{RequestEntity, RequestStatusDb};
use crate::error::storage_error;
use crate::metrics::QueryTimer;

const REQUEST_COLUMNS: &str = "id, from_user_id, to_user_id, destination_name, \
    destination_latitude, destination_longitude, message, status, expires_at, \
    responded_at, created_alert_id, created_at";

/// Answer guarded by `status = 'pending'`.
pub(crate) const RESPOND_IF_PENDING_SQL: &str = r#"
    UPDATE arrival_requests
    SET status = $2, responded_at = $3
    WHERE id = $1 AND status = 'pending'
    RETURNING id, from_user_id, to_user_id, destination_name, destination_latitude,
              destination_longitude, message, status, expires_at, responded_at,
              created_alert_id, created_at
"#;

/// Repository for arrival request database operations.
#[derive(Clone)]
pub struct RequestRepository {
    pool: PgPool,
}

impl RequestRepository {
    /// Creates a new RequestRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list_where(
        &self,
        query_name: &'static str,
        filter: &str,
        user_id: Uuid,
    ) -> Result<Vec<ArrivalRequest>, EngineError> {
        let timer = QueryTimer::new(query_name);
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM arrival_requests WHERE {filter} ORDER BY created_at DESC"
        );
        let result = sqlx::query_as::<_, RequestEntity>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(ArrivalRequest::from)
            .collect())
    }
}

#[async_trait]
impl RequestStore for RequestRepository {
    async fn insert_request(
        &self,
        new_request: NewArrivalRequest,
    ) -> Result<ArrivalRequest, EngineError> {
        let timer = QueryTimer::new("insert_arrival_request");
        let result = sqlx::query_as::<_, RequestEntity>(
            r#"
            INSERT INTO arrival_requests (id, from_user_id, to_user_id, destination_name,
                                          destination_latitude, destination_longitude, message,
                                          status, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
            RETURNING id, from_user_id, to_user_id, destination_name, destination_latitude,
                      destination_longitude, message, status, expires_at, responded_at,
                      created_alert_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_request.from_user_id)
        .bind(new_request.to_user_id)
        .bind(&new_request.destination_name)
        .bind(new_request.destination_latitude)
        .bind(new_request.destination_longitude)
        .bind(&new_request.message)
        .bind(new_request.expires_at)
        .bind(new_request.created_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(storage_error)?.into())
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<ArrivalRequest>, EngineError> {
        let timer = QueryTimer::new("find_arrival_request_by_id");
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM arrival_requests WHERE id = $1");
        let result = sqlx::query_as::<_, RequestEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(storage_error)?.map(ArrivalRequest::from))
    }

    async fn respond_if_pending(
        &self,
        id: Uuid,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ArrivalRequest>, EngineError> {
        let timer = QueryTimer::new("respond_arrival_request");
        let result = sqlx::query_as::<_, RequestEntity>(RESPOND_IF_PENDING_SQL)
            .bind(id)
            .bind(RequestStatusDb::from(status))
            .bind(at)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(storage_error)?.map(ArrivalRequest::from))
    }

    async fn accept_request(
        &self,
        request_id: Uuid,
        new_alert: NewAlert,
        at: DateTime<Utc>,
    ) -> Result<Option<(ArrivalRequest, Alert)>, EngineError> {
        let timer = QueryTimer::new("accept_arrival_request");
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let locked = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM arrival_requests
            WHERE id = $1 AND status = 'pending'
            FOR UPDATE
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;

        if locked.is_none() {
            // Dropping the transaction rolls it back.
            timer.record();
            return Ok(None);
        }

        let alert = insert_alert_with_recipients(&mut *tx, &new_alert)
            .await
            .map_err(storage_error)?;

        let request = sqlx::query_as::<_, RequestEntity>(
            r#"
            UPDATE arrival_requests
            SET status = 'accepted', responded_at = $2, created_alert_id = $3
            WHERE id = $1
            RETURNING id, from_user_id, to_user_id, destination_name, destination_latitude,
                      destination_longitude, message, status, expires_at, responded_at,
                      created_alert_id, created_at
            "#,
        )
        .bind(request_id)
        .bind(at)
        .bind(alert.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        timer.record();

        Ok(Some((request.into(), alert.into())))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        let timer = QueryTimer::new("expire_arrival_requests");
        let result = sqlx::query(
            r#"
            UPDATE arrival_requests
            SET status = 'expired'
            WHERE status = 'pending' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(storage_error)?.rows_affected())
    }

    async fn list_pending_for(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError> {
        self.list_where(
            "list_pending_arrival_requests",
            "to_user_id = $1 AND status = 'pending'",
            user_id,
        )
        .await
    }

    async fn list_sent_by(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError> {
        self.list_where("list_sent_arrival_requests", "from_user_id = $1", user_id)
            .await
    }
}
