use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use super::repo_types::{NewObservation, Observation, ObservationRow, PendingObservation};

/// Persistence for observations.
///
/// Rows reserved through [`ObservationStore::reserve`] carry no image list and
/// are invisible to `get`, `list` and `increment_views` until
/// `update_image_urls` finalizes them.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn create(&self, new: &NewObservation) -> anyhow::Result<Observation>;
    async fn get(&self, id: i64) -> anyhow::Result<Option<Observation>>;
    /// Published observations in id order.
    async fn list(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Observation>>;
    async fn reserve(&self, pending: &PendingObservation) -> anyhow::Result<i64>;
    async fn update_image_urls(&self, id: i64, urls: &[String])
        -> anyhow::Result<Option<Observation>>;
    /// Hard delete. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
    /// Adds one view and refreshes `updated_at` in a single statement.
    async fn increment_views(&self, id: i64) -> anyhow::Result<Option<Observation>>;
}

const RETURNING: &str = "id, user_id, caption, image_urls, \
     ST_X(location) AS longitude, ST_Y(location) AS latitude, \
     views, created_at, updated_at";

#[derive(Clone)]
pub struct PgObservationStore {
    db: PgPool,
}

impl PgObservationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ObservationStore for PgObservationStore {
    async fn create(&self, new: &NewObservation) -> anyhow::Result<Observation> {
        let row = sqlx::query_as::<_, ObservationRow>(&format!(
            r#"
            INSERT INTO observations (user_id, caption, image_urls, location)
            VALUES ($1, $2, $3, ST_SetSRID(ST_MakePoint($4, $5), 4326))
            RETURNING {RETURNING}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.caption)
        .bind(Json(&new.image_urls))
        .bind(new.longitude)
        .bind(new.latitude)
        .fetch_one(&self.db)
        .await
        .context("insert observation")?;
        Ok(row.into())
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<Observation>> {
        let row = sqlx::query_as::<_, ObservationRow>(&format!(
            r#"
            SELECT {RETURNING}
            FROM observations
            WHERE id = $1 AND image_urls IS NOT NULL
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get observation")?;
        Ok(row.map(Into::into))
    }

    async fn list(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Observation>> {
        let rows = sqlx::query_as::<_, ObservationRow>(&format!(
            r#"
            SELECT {RETURNING}
            FROM observations
            WHERE image_urls IS NOT NULL
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list observations")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn reserve(&self, pending: &PendingObservation) -> anyhow::Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO observations (user_id, caption, image_urls, location)
            VALUES ($1, $2, NULL, ST_SetSRID(ST_MakePoint($3, $4), 4326))
            RETURNING id
            "#,
        )
        .bind(pending.user_id)
        .bind(&pending.caption)
        .bind(pending.longitude)
        .bind(pending.latitude)
        .fetch_one(&self.db)
        .await
        .context("reserve observation")?;
        Ok(id)
    }

    async fn update_image_urls(
        &self,
        id: i64,
        urls: &[String],
    ) -> anyhow::Result<Option<Observation>> {
        let row = sqlx::query_as::<_, ObservationRow>(&format!(
            r#"
            UPDATE observations
               SET image_urls = $2, updated_at = GREATEST(now(), created_at)
             WHERE id = $1
            RETURNING {RETURNING}
            "#
        ))
        .bind(id)
        .bind(Json(urls))
        .fetch_optional(&self.db)
        .await
        .context("update observation image urls")?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM observations WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete observation")?;
        Ok(res.rows_affected() > 0)
    }

    async fn increment_views(&self, id: i64) -> anyhow::Result<Option<Observation>> {
        let row = sqlx::query_as::<_, ObservationRow>(&format!(
            r#"
            UPDATE observations
               SET views = views + 1, updated_at = GREATEST(now(), created_at)
             WHERE id = $1 AND image_urls IS NOT NULL
            RETURNING {RETURNING}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("increment observation views")?;
        Ok(row.map(Into::into))
    }
}
