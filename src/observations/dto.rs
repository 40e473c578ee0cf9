use serde::Deserialize;

use super::services::DEFAULT_PAGE_LIMIT;

#[derive(Debug, Deserialize)]
pub struct CreateObservationRequest {
    pub caption: String,
    pub image_urls: Vec<String>,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}
