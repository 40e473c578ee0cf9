use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where uploaded images are written.
#[derive(Debug, Clone, Deserialize)]
pub enum StorageBackend {
    Local {
        upload_dir: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Externally reachable origin, e.g. `http://localhost:8080`.
    pub public_base_url: String,
    /// Path under which stored images are served, e.g. `/static/observations`.
    pub static_path: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "climbermap".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "climbermap-users".into()),
            ttl_minutes: parse_or("JWT_TTL_MINUTES", 30),
        };

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".into())
            .as_str()
        {
            "local" => StorageBackend::Local {
                upload_dir: std::env::var("UPLOAD_DIR")
                    .unwrap_or_else(|_| "uploads/observations".into()),
            },
            "s3" => StorageBackend::S3 {
                endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT must be set")?,
                bucket: std::env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
                access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY must be set")?,
                secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY must be set")?,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            },
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?}, expected local or s3"),
        };

        let storage = StorageConfig {
            backend,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            static_path: std::env::var("STATIC_PATH")
                .unwrap_or_else(|_| "/static/observations".into()),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024),
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            jwt,
            storage,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
