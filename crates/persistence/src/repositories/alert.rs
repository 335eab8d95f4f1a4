//! Alert repository: PostgreSQL implementation of [`AlertStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Alert, AlertRecipient, AlertStatus, NewAlert, Position};
use domain::services::{AlertStore, TransitionOutcome};
use domain::EngineError;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{AlertEntity, AlertRecipientEntity, AlertStatusDb};
use crate::error::storage_error;
use crate::metrics::QueryTimer;

/// Status change guarded by `status = 'active'`.
pub(crate) const TRANSITION_IF_ACTIVE_SQL: &str = r#"
    UPDATE alerts
    SET status = $2, triggered_at = $3
    WHERE id = $1 AND status = 'active'
    RETURNING id, owner_id, destination_name, destination_latitude, destination_longitude,
              radius_meters, fallback_minutes, fallback_at, status, triggered_at,
              last_known_latitude, last_known_longitude, last_known_at, created_at
"#;

/// Last-known-position write guarded by `status = 'active'`.
pub(crate) const RECORD_POSITION_IF_ACTIVE_SQL: &str = r#"
    UPDATE alerts
    SET last_known_latitude = $2, last_known_longitude = $3, last_known_at = $4
    WHERE id = $1 AND status = 'active'
"#;

/// `notified_at` stamp applied at most once.
pub(crate) const MARK_NOTIFIED_SQL: &str = r#"
    UPDATE alert_recipients
    SET notified_at = $3
    WHERE alert_id = $1 AND recipient_id = $2 AND notified_at IS NULL
"#;

/// Inserts an alert and its recipient rows on an open connection or
/// transaction.
pub(crate) async fn insert_alert_with_recipients(
    conn: &mut PgConnection,
    new_alert: &NewAlert,
) -> Result<AlertEntity, sqlx::Error> {
    let alert = sqlx::query_as::<_, AlertEntity>(
        r#"
        INSERT INTO alerts (id, owner_id, destination_name, destination_latitude,
                            destination_longitude, radius_meters, fallback_minutes,
                            fallback_at, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9)
        RETURNING id, owner_id, destination_name, destination_latitude, destination_longitude,
                  radius_meters, fallback_minutes, fallback_at, status, triggered_at,
                  last_known_latitude, last_known_longitude, last_known_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new_alert.owner_id)
    .bind(&new_alert.destination.name)
    .bind(new_alert.destination.latitude)
    .bind(new_alert.destination.longitude)
    .bind(new_alert.destination.radius_meters)
    .bind(new_alert.fallback_minutes)
    .bind(new_alert.fallback_at())
    .bind(new_alert.created_at)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO alert_recipients (alert_id, recipient_id)
        SELECT $1, UNNEST($2::uuid[])
        "#,
    )
    .bind(alert.id)
    .bind(&new_alert.recipient_ids)
    .execute(&mut *conn)
    .await?;

    Ok(alert)
}

/// Repository for alert-related database operations.
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    /// Creates a new AlertRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn insert_alert(&self, new_alert: NewAlert) -> Result<Alert, EngineError> {
        let timer = QueryTimer::new("insert_alert");
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let alert = insert_alert_with_recipients(&mut *tx, &new_alert)
            .await
            .map_err(storage_error)?;
        tx.commit().await.map_err(storage_error)?;
        timer.record();
        Ok(alert.into())
    }

    async fn find_alert(&self, id: Uuid) -> Result<Option<Alert>, EngineError> {
        let timer = QueryTimer::new("find_alert_by_id");
        let result = sqlx::query_as::<_, AlertEntity>(
            r#"
            SELECT id, owner_id, destination_name, destination_latitude, destination_longitude,
                   radius_meters, fallback_minutes, fallback_at, status, triggered_at,
                   last_known_latitude, last_known_longitude, last_known_at, created_at
            FROM alerts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(storage_error)?.map(Alert::from))
    }

    async fn find_active_for_owner(&self, owner_id: Uuid) -> Result<Option<Alert>, EngineError> {
        let timer = QueryTimer::new("find_active_alert_for_owner");
        let result = sqlx::query_as::<_, AlertEntity>(
            r#"
            SELECT id, owner_id, destination_name, destination_latitude, destination_longitude,
                   radius_meters, fallback_minutes, fallback_at, status, triggered_at,
                   last_known_latitude, last_known_longitude, last_known_at, created_at
            FROM alerts
            WHERE owner_id = $1 AND status = 'active'
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(storage_error)?.map(Alert::from))
    }

    async fn list_history(&self, owner_id: Uuid, limit: i64) -> Result<Vec<Alert>, EngineError> {
        let timer = QueryTimer::new("list_alert_history");
        let result = sqlx::query_as::<_, AlertEntity>(
            r#"
            SELECT id, owner_id, destination_name, destination_latitude, destination_longitude,
                   radius_meters, fallback_minutes, fallback_at, status, triggered_at,
                   last_known_latitude, last_known_longitude, last_known_at, created_at
            FROM alerts
            WHERE owner_id = $1 AND status <> 'active'
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(Alert::from)
            .collect())
    }

    async fn list_recipients(&self, alert_id: Uuid) -> Result<Vec<AlertRecipient>, EngineError> {
        let timer = QueryTimer::new("list_alert_recipients");
        let result = sqlx::query_as::<_, AlertRecipientEntity>(
            r#"
            SELECT alert_id, recipient_id, notified_at
            FROM alert_recipients
            WHERE alert_id = $1
            "#,
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(AlertRecipient::from)
            .collect())
    }

    async fn list_active(&self) -> Result<Vec<Alert>, EngineError> {
        let timer = QueryTimer::new("list_active_alerts");
        let result = sqlx::query_as::<_, AlertEntity>(
            r#"
            SELECT id, owner_id, destination_name, destination_latitude, destination_longitude,
                   radius_meters, fallback_minutes, fallback_at, status, triggered_at,
                   last_known_latitude, last_known_longitude, last_known_at, created_at
            FROM alerts
            WHERE status = 'active'
            ORDER BY fallback_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(Alert::from)
            .collect())
    }

    async fn transition_if_active(
        &self,
        id: Uuid,
        to: AlertStatus,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<TransitionOutcome, EngineError> {
        let timer = QueryTimer::new("transition_alert_if_active");
        let updated = sqlx::query_as::<_, AlertEntity>(TRANSITION_IF_ACTIVE_SQL)
            .bind(id)
            .bind(AlertStatusDb::from(to))
            .bind(triggered_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        let outcome = match updated {
            Some(entity) => TransitionOutcome::Applied(entity.into()),
            None => {
                let current =
                    sqlx::query_scalar::<_, AlertStatusDb>("SELECT status FROM alerts WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(storage_error)?;
                TransitionOutcome::Lost {
                    current: current.map(AlertStatus::from),
                }
            }
        };
        timer.record();
        Ok(outcome)
    }

    async fn record_position_if_active(
        &self,
        id: Uuid,
        position: &Position,
    ) -> Result<bool, EngineError> {
        let timer = QueryTimer::new("record_alert_position");
        let result = sqlx::query(RECORD_POSITION_IF_ACTIVE_SQL)
            .bind(id)
            .bind(position.latitude)
            .bind(position.longitude)
            .bind(position.recorded_at)
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(storage_error)?.rows_affected() > 0)
    }

    async fn find_overdue(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Alert>, EngineError> {
        let timer = QueryTimer::new("find_overdue_alerts");
        let result = sqlx::query_as::<_, AlertEntity>(
            r#"
            SELECT id, owner_id, destination_name, destination_latitude, destination_longitude,
                   radius_meters, fallback_minutes, fallback_at, status, triggered_at,
                   last_known_latitude, last_known_longitude, last_known_at, created_at
            FROM alerts
            WHERE status = 'active' AND fallback_at < $1
            ORDER BY fallback_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(storage_error)?
            .into_iter()
            .map(Alert::from)
            .collect())
    }

    async fn mark_recipient_notified(
        &self,
        alert_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let timer = QueryTimer::new("mark_alert_recipient_notified");
        let result = sqlx::query(MARK_NOTIFIED_SQL)
            .bind(alert_id)
            .bind(recipient_id)
            .bind(at)
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(storage_error)?.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_writes_check_active_status() {
        assert!(TRANSITION_IF_ACTIVE_SQL.contains("WHERE id = $1 AND status = 'active'"));
        assert!(TRANSITION_IF_ACTIVE_SQL.contains("RETURNING"));
        assert!(RECORD_POSITION_IF_ACTIVE_SQL.contains("AND status = 'active'"));
    }

    #[test]
    fn test_notified_stamp_is_write_once() {
        assert!(MARK_NOTIFIED_SQL.contains("notified_at IS NULL"));
    }
}
