//! Shared utilities and common types for the Arrival Guard backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Coordinate and payload validation
//! - Geodesic distance helpers for geofence checks

pub mod geodesy;
pub mod validation;
