//! Import pipeline defaults

/// Rows persisted per chunk
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Largest accepted upload (10 MiB)
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Validation errors returned by a preview
pub const DEFAULT_PREVIEW_ERROR_LIMIT: usize = 20;

/// Concurrent import jobs per worker process
pub const DEFAULT_IMPORT_WORKERS: usize = 2;

pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
