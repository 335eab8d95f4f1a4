//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod alert;
pub mod profile;
pub mod request;

pub use alert::{AlertEntity, AlertRecipientEntity, AlertStatusDb};
pub use profile::ProfileEntity;
pub use request::{RequestEntity, RequestStatusDb};
