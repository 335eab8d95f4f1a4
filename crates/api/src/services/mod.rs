//! Infrastructure services behind the engine's collaborator traits.

pub mod expo_push;

pub use expo_push::ExpoPushService;
