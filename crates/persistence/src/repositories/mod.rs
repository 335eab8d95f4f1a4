//! PostgreSQL implementations of the engine's storage traits.

pub mod alert;
pub mod profile;
pub mod request;

pub use alert::AlertRepository;
pub use profile::ProfileRepository;
pub use request::RequestRepository;
