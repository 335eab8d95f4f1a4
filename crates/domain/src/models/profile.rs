//! User profile as seen by the engine (identity and push address lookup).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name used when a profile carries neither a full name nor a username.
pub const ANONYMOUS_DISPLAY_NAME: &str = "Someone";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub push_token: Option<String>,
}

impl Profile {
    /// Full name, else username, else a generic placeholder.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.username.trim()).filter(|name| !name.is_empty()))
            .unwrap_or(ANONYMOUS_DISPLAY_NAME)
    }

    /// Push address, if one is registered and non-empty.
    pub fn push_address(&self) -> Option<&str> {
        self.push_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Display name for an optional profile.
pub fn display_name_of(profile: Option<&Profile>) -> String {
    profile
        .map(|p| p.display_name().to_string())
        .unwrap_or_else(|| ANONYMOUS_DISPLAY_NAME.to_string())
}
