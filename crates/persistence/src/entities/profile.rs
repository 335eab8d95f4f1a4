//! Profile entity (database row mapping).

use domain::models::Profile;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the profiles table.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileEntity {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub push_token: Option<String>,
}

impl From<ProfileEntity> for Profile {
    fn from(entity: ProfileEntity) -> Self {
        Profile {
            id: entity.id,
            username: entity.username,
            full_name: entity.full_name,
            push_token: entity.push_token,
        }
    }
}
