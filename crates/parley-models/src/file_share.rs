use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Read,
    Write,
}

impl PermissionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            _ => None,
        }
    }

    /// Write implies read; read never implies write.
    pub fn allows(self, required: PermissionType) -> bool {
        matches!(
            (self, required),
            (Self::Write, _) | (Self::Read, Self::Read)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Pending,
    Approved,
    Denied,
}

impl PermissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareDecision {
    Approve,
    Deny,
}

impl ShareDecision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "approve" => Some(Self::Approve),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }

    pub fn resulting_status(self) -> PermissionStatus {
        match self {
            Self::Approve => PermissionStatus::Approved,
            Self::Deny => PermissionStatus::Denied,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    View,
    Download,
}

impl AccessAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "view" => Some(Self::View),
            "download" => Some(Self::Download),
            _ => None,
        }
    }
}

/// Share metadata safe to hand to any room member. Content is only sent
/// through [`SharedFileContent`] after the consent check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShareInfo {
    pub share_token: String,
    pub room_id: String,
    pub owner_username: String,
    pub file_path: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub username: String,
    pub permission_type: PermissionType,
    pub status: PermissionStatus,
    pub granted_by: Option<String>,
    pub reason: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShareRequestNotice {
    pub share_token: String,
    pub owner_username: String,
    pub target_username: String,
    pub file_name: String,
    pub file_type: String,
    pub permission_type: PermissionType,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileShareDecisionNotice {
    pub share_token: String,
    pub owner_username: String,
    pub username: String,
    pub file_name: String,
    pub reason: Option<String>,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFileContent {
    pub share_token: String,
    pub file_name: String,
    pub file_type: String,
    pub content: String,
    pub action: AccessAction,
    pub permission_type: PermissionType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFileUpdate {
    pub share_token: String,
    pub file_name: String,
    pub content: String,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// One row of `shared-files-list`. Owners see every consent track; targets
/// only see their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFileEntry {
    pub share: FileShareInfo,
    pub is_owner: bool,
    pub permissions: Vec<PermissionInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_permission_covers_reads() {
        assert!(PermissionType::Write.allows(PermissionType::Read));
        assert!(PermissionType::Write.allows(PermissionType::Write));
        assert!(PermissionType::Read.allows(PermissionType::Read));
        assert!(!PermissionType::Read.allows(PermissionType::Write));
    }

    #[test]
    fn decisions_map_to_terminal_statuses() {
        assert_eq!(
            ShareDecision::Approve.resulting_status(),
            PermissionStatus::Approved
        );
        assert_eq!(ShareDecision::Deny.resulting_status(), PermissionStatus::Denied);
        assert_eq!(ShareDecision::parse("approved"), None);
    }
}
