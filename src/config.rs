//! Configuration management

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{self, Context, Result};

use crate::defaults::{
    DEFAULT_BATCH_SIZE, DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_IMPORT_WORKERS,
    DEFAULT_MAX_FILE_SIZE_BYTES, DEFAULT_PREVIEW_ERROR_LIMIT, DEFAULT_UPLOAD_DIR,
};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    pub db_max_connections: u32,

    /// JWT secret key for token validation
    pub jwt_secret: String,

    pub import: ImportConfig,
}

/// Which queue implementation backs import jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Memory,
    JetStream,
}

impl FromStr for QueueBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-process" | "inprocess" => Ok(QueueBackend::Memory),
            "jetstream" | "nats" => Ok(QueueBackend::JetStream),
            other => anyhow::bail!("unknown queue backend '{}' (expected memory or jetstream)", other),
        }
    }
}

/// Import pipeline settings; usable without a database or NATS
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Where accepted uploads are stored until their job finishes
    pub upload_dir: PathBuf,
    pub max_file_size_bytes: u64,
    pub batch_size: usize,
    pub workers: usize,
    pub queue_backend: QueueBackend,
    /// Submit replies only after the job reaches a terminal state
    pub wait_for_completion: bool,
    pub preview_error_limit: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_IMPORT_WORKERS,
            queue_backend: QueueBackend::Memory,
            wait_for_completion: true,
            preview_error_limit: DEFAULT_PREVIEW_ERROR_LIMIT,
        }
    }
}

impl ImportConfig {
    /// Load import settings from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let queue_backend = parse_var(&lookup, "IMPORT_QUEUE_BACKEND", defaults.queue_backend)?;
        // Waiting on a broker-backed job would tie a request to another instance
        let wait_default = queue_backend == QueueBackend::Memory;

        let config = Self {
            upload_dir: lookup("UPLOAD_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_file_size_bytes: parse_var(
                &lookup,
                "IMPORT_MAX_FILE_SIZE_BYTES",
                defaults.max_file_size_bytes,
            )?,
            batch_size: parse_var(&lookup, "IMPORT_BATCH_SIZE", defaults.batch_size)?,
            workers: parse_var(&lookup, "IMPORT_WORKERS", defaults.workers)?,
            queue_backend,
            wait_for_completion: parse_var(&lookup, "IMPORT_WAIT_FOR_COMPLETION", wait_default)?,
            preview_error_limit: parse_var(
                &lookup,
                "IMPORT_PREVIEW_ERROR_LIMIT",
                defaults.preview_error_limit,
            )?,
        };

        if config.batch_size == 0 {
            anyhow::bail!("IMPORT_BATCH_SIZE must be greater than zero");
        }
        if config.workers == 0 {
            anyhow::bail!("IMPORT_WORKERS must be greater than zero");
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, value, e)),
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let db_max_connections = parse_var(
            &|key: &str| std::env::var(key).ok(),
            "DATABASE_MAX_CONNECTIONS",
            DEFAULT_DB_MAX_CONNECTIONS,
        )?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (generate one with: openssl rand -base64 48)")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
                jwt_secret.len()
            );
        }

        const KNOWN_DEV_SECRETS: &[&str] = &[
            "dev-secret-change-in-production-min-32-bytes!!",
        ];
        if KNOWN_DEV_SECRETS.contains(&jwt_secret.as_str()) {
            tracing::warn!("JWT_SECRET matches a known default, change it for production!");
        }

        let import = ImportConfig::from_env()?;

        Ok(Self {
            nats_url,
            database_url,
            db_max_connections,
            jwt_secret,
            import,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_import_config_defaults() {
        let config = ImportConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_file_size_bytes, 10_485_760);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.preview_error_limit, 20);
        assert_eq!(config.queue_backend, QueueBackend::Memory);
        assert!(config.wait_for_completion);
    }

    #[test]
    fn test_jetstream_backend_does_not_wait_by_default() {
        let config =
            ImportConfig::from_lookup(lookup(&[("IMPORT_QUEUE_BACKEND", "JetStream")])).unwrap();
        assert_eq!(config.queue_backend, QueueBackend::JetStream);
        assert!(!config.wait_for_completion);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ImportConfig::from_lookup(lookup(&[
            ("IMPORT_BATCH_SIZE", " 100 "),
            ("IMPORT_MAX_FILE_SIZE_BYTES", "2048"),
            ("UPLOAD_DIR", "/tmp/imports"),
        ]))
        .unwrap();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_file_size_bytes, 2048);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/imports"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ImportConfig::from_lookup(lookup(&[("IMPORT_BATCH_SIZE", "many")])).is_err());
        assert!(ImportConfig::from_lookup(lookup(&[("IMPORT_BATCH_SIZE", "0")])).is_err());
        assert!(ImportConfig::from_lookup(lookup(&[("IMPORT_QUEUE_BACKEND", "kafka")])).is_err());
    }
}
