use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a room. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub username: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Whether a live connection currently holds this username.
    pub online: bool,
}
