use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Where avatars end up. `endpoint` is only set for MinIO and other
/// S3-compatible hosts; plain AWS resolves it from the region.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub cookie_secure: bool,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: var_or("JWT_ISSUER", "accountd"),
            audience: var_or("JWT_AUDIENCE", "accountd-users"),
            access_ttl_minutes: parsed_or("ACCESS_TOKEN_TTL_MINUTES", 60 * 24),
            refresh_ttl_minutes: parsed_or("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 10),
        };
        if jwt.access_secret == jwt.refresh_secret {
            tracing::warn!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET are identical");
        }
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            bucket: required("S3_BUCKET")?,
            access_key: var_or("S3_ACCESS_KEY", ""),
            secret_key: var_or("S3_SECRET_KEY", ""),
            region: var_or("S3_REGION", "us-east-1"),
            public_base_url: std::env::var("MEDIA_PUBLIC_URL").ok().filter(|v| !v.is_empty()),
        };
        let http = HttpConfig {
            host: var_or("APP_HOST", "0.0.0.0"),
            port: parsed_or("APP_PORT", 8080),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
            cookie_secure: parsed_or("COOKIE_SECURE", true),
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "./public/temp")),
            static_dir: PathBuf::from(var_or("STATIC_DIR", "./public")),
            max_upload_bytes: parsed_or("MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            http,
        })
    }
}
