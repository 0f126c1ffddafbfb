//! Database queries

pub mod advisor;
pub mod dealer;
pub mod import_error;
pub mod import_job;
pub mod records;
