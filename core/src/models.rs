//! Data models for Chatlink

use serde::{Deserialize, Serialize};

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub username: String,
    #[serde(rename = "profilePicture", default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub kind: String,
    #[serde(rename = "fromUser")]
    pub from_user: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ============================================================================
// Conversations
// ============================================================================

/// Order-independent key for the conversation between two users.
pub fn pairing_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

/// The other participant of a pairing id, if `user_id` is one of its halves.
///
/// Either id may itself contain `_`, so the local id is stripped from each end
/// and the remainder kept only if it pairs back to `chat_id`.
pub fn counterpart_of(chat_id: &str, user_id: &str) -> Option<String> {
    let leading = chat_id
        .strip_prefix(user_id)
        .and_then(|rest| rest.strip_prefix('_'));
    let trailing = chat_id
        .strip_suffix(user_id)
        .and_then(|rest| rest.strip_suffix('_'));

    [leading, trailing]
        .into_iter()
        .flatten()
        .find(|other| !other.is_empty() && pairing_id(user_id, other) == chat_id)
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Me,
    Peer,
}

impl SenderRole {
    pub fn of(origin_id: &str, local_user_id: &str) -> Self {
        if origin_id == local_user_id {
            Self::Me
        } else {
            Self::Peer
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub sender: SenderRole,
}

impl Message {
    pub fn is_outgoing(&self) -> bool {
        self.sender == SenderRole::Me
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub text: String,
    pub timestamp: i64,
}

// ============================================================================
// Calls
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Audio,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Audio => "audio",
            CallKind::Video => "video",
        }
    }

    pub fn has_video(&self) -> bool {
        matches!(self, CallKind::Video)
    }
}

impl std::str::FromStr for CallKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(CallKind::Audio),
            "video" => Ok(CallKind::Video),
            other => Err(format!("unknown call kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Idle,
    Outgoing,
    Incoming,
    Connected,
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::Outgoing => "outgoing",
            CallStatus::Incoming => "incoming",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    LocalHangup,
    LocalReject,
    RemoteRejected,
    RemoteEnded,
    RemoteFailed(String),
    CapabilityDenied(String),
    SignalingFailed(String),
    Timeout,
    Shutdown,
}

/// Session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Network candidate exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}
