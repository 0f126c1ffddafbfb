//! Business logic services

pub mod batch_persister;
pub mod error_log;
pub mod file_parser;
pub mod import_processor;
pub mod job_queue;
pub mod reference_resolver;
pub mod row_validator;
