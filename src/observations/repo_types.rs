use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Row shape as selected from Postgres, with the point already split by
/// `ST_X`/`ST_Y`.
#[derive(Debug, FromRow)]
pub struct ObservationRow {
    pub id: i64,
    pub user_id: Uuid,
    pub caption: String,
    pub image_urls: Json<Vec<String>>,
    pub longitude: f64,
    pub latitude: f64,
    pub views: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A published observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub id: i64,
    pub user_id: Uuid,
    pub caption: String,
    pub image_urls: Vec<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ObservationRow> for Observation {
    fn from(r: ObservationRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            caption: r.caption,
            image_urls: r.image_urls.0,
            longitude: r.longitude,
            latitude: r.latitude,
            views: r.views,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Validated input for a new observation.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub user_id: Uuid,
    pub caption: String,
    pub image_urls: Vec<String>,
    pub longitude: f64,
    pub latitude: f64,
}

/// An observation whose images are still being uploaded. It has no image
/// list yet and stays hidden from reads until finalized.
#[derive(Debug, Clone)]
pub struct PendingObservation {
    pub user_id: Uuid,
    pub caption: String,
    pub longitude: f64,
    pub latitude: f64,
}
