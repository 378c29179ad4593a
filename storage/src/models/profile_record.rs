//! Profile record model; maps to the `profiles` table.

use chat_core::Profile;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRecord {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<ProfileRecord> for Profile {
    fn from(record: ProfileRecord) -> Self {
        Profile {
            id: record.id,
            display_name: record.display_name,
            avatar_url: record.avatar_url,
            is_placeholder: false,
        }
    }
}
