//! Type definitions

pub mod booking;
pub mod dealer;
pub mod enquiry;
pub mod import;
pub mod import_job;
pub mod messages;
pub mod quotation;

pub use booking::*;
pub use dealer::*;
pub use enquiry::*;
pub use import::*;
pub use import_job::*;
pub use messages::*;
pub use quotation::*;
