//! Repository for `notifications` (spec.md §4.2 NotificationRepository):
//! append-only, emitted on terminal job transitions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Notification;
use crate::error::CoreError;

pub struct NotificationRepository;

impl NotificationRepository {
    /// Takes any `PgExecutor` so callers can insert within an open
    /// transaction (spec.md §4.5 step 8 emits the notification alongside
    /// the terminal status transition, not after it commits).
    pub async fn create(
        executor: impl sqlx::PgExecutor<'_>,
        user_id: Uuid,
        notification_type: &str,
        payload: serde_json::Value,
    ) -> Result<Notification, CoreError> {
        let id = Uuid::new_v4();
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (id, user_id, notification_type, payload, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(notification_type)
        .bind(payload)
        .fetch_one(executor)
        .await?;

        Ok(row.into())
    }

    pub async fn get_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Notification>, CoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    notification_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            notification_type: row.notification_type,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}
