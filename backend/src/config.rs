use std::{env, path::PathBuf};

use anyhow::{bail, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Local { root: PathBuf },
    S3 { bucket: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub storage: StorageBackend,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub max_attachment_bytes: usize,
    pub default_page_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "mailroom".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "mailroom-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let storage = parse_storage_backend(
            &env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string()),
            env::var("ATTACHMENTS_DIR").ok(),
            env::var("S3_BUCKET").ok(),
        )?;
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let max_attachment_bytes = env::var("MAX_ATTACHMENT_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_ATTACHMENT_BYTES.to_string())
            .parse()
            .context("MAX_ATTACHMENT_BYTES must be a positive integer")?;
        let default_page_size: i64 = env::var("DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("DEFAULT_PAGE_SIZE must be an integer")?;
        if default_page_size < 1 {
            bail!("DEFAULT_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            storage,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            max_attachment_bytes,
            default_page_size,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    /// Request body ceiling: the attachment cap plus room for the form fields,
    /// so oversized files still reach validation instead of being cut off.
    pub fn body_limit(&self) -> usize {
        body_limit_for(self.max_attachment_bytes)
    }
}

fn body_limit_for(max_attachment_bytes: usize) -> usize {
    max_attachment_bytes
        .saturating_mul(2)
        .saturating_add(1024 * 1024)
}

fn parse_storage_backend(
    kind: &str,
    attachments_dir: Option<String>,
    s3_bucket: Option<String>,
) -> Result<StorageBackend> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "local" | "fs" => Ok(StorageBackend::Local {
            root: attachments_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storage/attachments")),
        }),
        "s3" => {
            let bucket = s3_bucket.context("S3_BUCKET must be set when STORAGE_BACKEND=s3")?;
            Ok(StorageBackend::S3 { bucket })
        }
        other => bail!("unsupported STORAGE_BACKEND '{other}' (expected 'local' or 's3')"),
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
