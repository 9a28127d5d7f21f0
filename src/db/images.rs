use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Image, ImageSummary};
use crate::pagination::Page;

pub async fn create(
    pool: &PgPool,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Result<Image, sqlx::Error> {
    sqlx::query_as::<_, Image>(
        "INSERT INTO images (filename, content_type, data) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(filename)
    .bind(content_type)
    .bind(data)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Image>, sqlx::Error> {
    sqlx::query_as::<_, Image>("SELECT * FROM images WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_summary(pool: &PgPool, id: Uuid) -> Result<Option<ImageSummary>, sqlx::Error> {
    sqlx::query_as::<_, ImageSummary>(
        "SELECT id, filename, content_type, octet_length(data)::bigint AS size, created_at
         FROM images WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &PgPool, page: Page) -> Result<(Vec<ImageSummary>, i64), sqlx::Error> {
    let images = sqlx::query_as::<_, ImageSummary>(
        "SELECT id, filename, content_type, octet_length(data)::bigint AS size, created_at
         FROM images ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images")
        .fetch_one(pool)
        .await?;
    Ok((images, row.0))
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<ImageSummary>, sqlx::Error> {
    sqlx::query_as::<_, ImageSummary>(
        "DELETE FROM images WHERE id = $1
         RETURNING id, filename, content_type, octet_length(data)::bigint AS size, created_at",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
