//! Domain layer for the Arrival Guard backend.
//!
//! This crate contains:
//! - Domain models (Alert, AlertRecipient, ArrivalRequest, Profile, Position)
//! - The arrival detection and fallback alert engine
//! - Collaborator traits for persistence, push delivery and location
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::EngineError;
