//! Gateway wire protocol.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`. Each
//! direction is a closed union so the handler matches exhaustively over the
//! surface instead of dispatching on strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file_share::{
    FileShareDecisionNotice, FileShareInfo, FileShareRequestNotice, ShareDecision,
    SharedFileContent, SharedFileEntry, SharedFileUpdate,
};
use crate::message::ChatMessage;
use crate::room::{ParticipantInfo, RoomSummary};

// Client -> Server event names
pub const EVENT_JOIN_ROOM: &str = "join-room";
pub const EVENT_SEND_MESSAGE: &str = "send-message";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_GET_PROFILE_URL: &str = "get-profile-url";
pub const EVENT_REQUEST_FILE_SHARE: &str = "request-file-share";
pub const EVENT_RESPOND_FILE_SHARE: &str = "respond-file-share";
pub const EVENT_ACCESS_SHARED_FILE: &str = "access-shared-file";
pub const EVENT_UPDATE_SHARED_FILE: &str = "update-shared-file";
pub const EVENT_GET_SHARED_FILES: &str = "get-shared-files";

pub const CLIENT_EVENTS: &[&str] = &[
    EVENT_JOIN_ROOM,
    EVENT_SEND_MESSAGE,
    EVENT_TYPING,
    EVENT_GET_PROFILE_URL,
    EVENT_REQUEST_FILE_SHARE,
    EVENT_RESPOND_FILE_SHARE,
    EVENT_ACCESS_SHARED_FILE,
    EVENT_UPDATE_SHARED_FILE,
    EVENT_GET_SHARED_FILES,
];

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    JoinRoom(JoinRoom),
    SendMessage(SendMessage),
    Typing(Typing),
    GetProfileUrl(GetProfileUrl),
    RequestFileShare(RequestFileShare),
    RespondFileShare(RespondFileShare),
    AccessSharedFile(AccessSharedFile),
    UpdateSharedFile(UpdateSharedFile),
    GetSharedFiles(GetSharedFiles),
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => EVENT_JOIN_ROOM,
            Self::SendMessage(_) => EVENT_SEND_MESSAGE,
            Self::Typing(_) => EVENT_TYPING,
            Self::GetProfileUrl(_) => EVENT_GET_PROFILE_URL,
            Self::RequestFileShare(_) => EVENT_REQUEST_FILE_SHARE,
            Self::RespondFileShare(_) => EVENT_RESPOND_FILE_SHARE,
            Self::AccessSharedFile(_) => EVENT_ACCESS_SHARED_FILE,
            Self::UpdateSharedFile(_) => EVENT_UPDATE_SHARED_FILE,
            Self::GetSharedFiles(_) => EVENT_GET_SHARED_FILES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoom {
    pub room_slug: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    pub room_slug: String,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Typing {
    pub room_slug: String,
    pub username: String,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetProfileUrl {
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFileShare {
    /// Optional; when present it must match the connection's bound room.
    #[serde(default)]
    pub room_slug: Option<String>,
    /// Optional; when present it must match the connection's bound username.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    pub file_name: String,
    pub file_content: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub target_users: Option<Vec<String>>,
    #[serde(default)]
    pub permission_type: Option<String>,
    #[serde(default)]
    pub expiry_hours: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondFileShare {
    pub share_token: String,
    pub username: String,
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessSharedFile {
    pub share_token: String,
    pub username: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSharedFile {
    pub share_token: String,
    pub username: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetSharedFiles {
    pub room_slug: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    JoinedRoom {
        room: RoomSummary,
        username: String,
    },
    UserJoined {
        username: String,
        joined_at: DateTime<Utc>,
    },
    ParticipantsList {
        participants: Vec<ParticipantInfo>,
    },
    NewMessage(ChatMessage),
    UserTyping {
        username: String,
        is_typing: bool,
    },
    ProfileUrlResponse {
        username: String,
        profile_url: Option<String>,
        exists: bool,
    },
    FileShareCreated {
        share: FileShareInfo,
        targets: Vec<String>,
    },
    FileShareRequest(FileShareRequestNotice),
    FileShareResponseSent {
        share_token: String,
        action: ShareDecision,
    },
    FileShareApproved(FileShareDecisionNotice),
    FileShareDenied(FileShareDecisionNotice),
    SharedFileContent(SharedFileContent),
    SharedFileUpdated(SharedFileUpdate),
    SharedFilesList {
        shares: Vec<SharedFileEntry>,
    },
    FileShareRevoked {
        share_token: String,
        owner_username: String,
    },
    UserLeft {
        username: String,
        left_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl GatewayEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinedRoom { .. } => "joined-room",
            Self::UserJoined { .. } => "user-joined",
            Self::ParticipantsList { .. } => "participants-list",
            Self::NewMessage(_) => "new-message",
            Self::UserTyping { .. } => "user-typing",
            Self::ProfileUrlResponse { .. } => "profile-url-response",
            Self::FileShareCreated { .. } => "file-share-created",
            Self::FileShareRequest(_) => "file-share-request",
            Self::FileShareResponseSent { .. } => "file-share-response-sent",
            Self::FileShareApproved(_) => "file-share-approved",
            Self::FileShareDenied(_) => "file-share-denied",
            Self::SharedFileContent(_) => "shared-file-content",
            Self::SharedFileUpdated(_) => "shared-file-updated",
            Self::SharedFilesList { .. } => "shared-files-list",
            Self::FileShareRevoked { .. } => "file-share-revoked",
            Self::UserLeft { .. } => "user-left",
            Self::Error { .. } => "error",
        }
    }
}
