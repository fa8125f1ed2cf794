//! Repository for `images` (spec.md §4.2 ImageRepository), grounded in
//! the same row-struct/`From` pattern as `job_repository`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Image, NewImage};
use crate::error::CoreError;

pub struct ImageRepository;

impl ImageRepository {
    /// Inserts one row per downloaded image within the caller's
    /// transaction, returning the persisted rows in insertion order.
    /// Bulk insert rather than N round trips, matching `ob-poc`'s
    /// `deal_repository::bulk_insert_line_items` shape.
    pub async fn bulk_create(
        tx: &mut Transaction<'_, Postgres>,
        crawl_job_id: Uuid,
        images: Vec<NewImage>,
    ) -> Result<Vec<Image>, CoreError> {
        let mut created = Vec::with_capacity(images.len());
        for image in images {
            let id = Uuid::new_v4();
            let row = sqlx::query_as::<_, ImageRow>(
                r#"
                INSERT INTO images
                    (id, crawl_job_id, source_url, storage_key, width, height,
                     bytes, format, content_hash, perceptual_hash, is_valid,
                     is_duplicate, labels, metadata, created_at)
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, NULL, $11, $12, now())
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(crawl_job_id)
            .bind(&image.source_url)
            .bind(&image.storage_key)
            .bind(image.width)
            .bind(image.height)
            .bind(image.bytes)
            .bind(&image.format)
            .bind(&image.content_hash)
            .bind(&image.perceptual_hash)
            .bind(&image.labels)
            .bind(&image.metadata)
            .fetch_one(&mut **tx)
            .await?;

            created.push(row.into());
        }
        Ok(created)
    }

    /// Sets the validation verdict for one image (spec.md §4.6
    /// validate_job_images). `is_duplicate` is only ever set true by the
    /// caller when a perceptual-hash match against an earlier-valid image
    /// in the same job was found; this repository just persists the call.
    pub async fn mark_validated(
        pool: &PgPool,
        id: Uuid,
        is_valid: bool,
        is_duplicate: bool,
    ) -> Result<Image, CoreError> {
        let row = sqlx::query_as::<_, ImageRow>(
            r#"
            UPDATE images
            SET is_valid = $2, is_duplicate = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(is_valid)
        .bind(is_duplicate)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("image {id} not found")))?;

        Ok(row.into())
    }

    pub async fn get_by_job(pool: &PgPool, crawl_job_id: Uuid) -> Result<Vec<Image>, CoreError> {
        let rows = sqlx::query_as::<_, ImageRow>(
            r#"SELECT * FROM images WHERE crawl_job_id = $1 ORDER BY created_at"#,
        )
        .bind(crawl_job_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Returns `(total, valid)` counts for a job (spec.md §4.2
    /// `ImageRepository` contract).
    pub async fn count_by_job(pool: &PgPool, crawl_job_id: Uuid) -> Result<(i64, i64), CoreError> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                count(*) AS total,
                count(*) FILTER (WHERE is_valid = true) AS valid
            FROM images
            WHERE crawl_job_id = $1
            "#,
        )
        .bind(crawl_job_id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    crawl_job_id: Uuid,
    source_url: String,
    storage_key: String,
    width: Option<i32>,
    height: Option<i32>,
    bytes: Option<i64>,
    format: Option<String>,
    content_hash: Option<String>,
    perceptual_hash: Option<String>,
    is_valid: Option<bool>,
    is_duplicate: Option<bool>,
    labels: serde_json::Value,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            crawl_job_id: row.crawl_job_id,
            source_url: row.source_url,
            storage_key: row.storage_key,
            width: row.width,
            height: row.height,
            bytes: row.bytes,
            format: row.format,
            content_hash: row.content_hash,
            perceptual_hash: row.perceptual_hash,
            is_valid: row.is_valid,
            is_duplicate: row.is_duplicate,
            labels: row.labels,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}
