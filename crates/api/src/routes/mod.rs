//! HTTP route handlers.

pub mod alerts;
pub mod health;
pub mod internal;
pub mod locations;
pub mod requests;
