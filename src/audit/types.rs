use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// AuditAction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    NonceMint,
    NonceConsume,
    PageRequest,
    InvalidNonce,
    RateLimited,
    FullscreenExit,
    CaptureDetected,
    View,
    PrintAttempt,
    DownloadAttempt,
    AuthFail,
}

impl AuditAction {
    pub const ALL: [AuditAction; 11] = [
        Self::NonceMint,
        Self::NonceConsume,
        Self::PageRequest,
        Self::InvalidNonce,
        Self::RateLimited,
        Self::FullscreenExit,
        Self::CaptureDetected,
        Self::View,
        Self::PrintAttempt,
        Self::DownloadAttempt,
        Self::AuthFail,
    ];

    /// Actions counted towards a client's rejected-access score.
    pub const REJECTIONS: [AuditAction; 2] = [Self::InvalidNonce, Self::AuthFail];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonceMint => "nonce_mint",
            Self::NonceConsume => "nonce_consume",
            Self::PageRequest => "page_request",
            Self::InvalidNonce => "invalid_nonce",
            Self::RateLimited => "rate_limited",
            Self::FullscreenExit => "fullscreen_exit",
            Self::CaptureDetected => "capture_detected",
            Self::View => "view",
            Self::PrintAttempt => "print_attempt",
            Self::DownloadAttempt => "download_attempt",
            Self::AuthFail => "auth_fail",
        }
    }

    /// Signals a viewer may report about itself.
    pub fn is_client_signal(self) -> bool {
        matches!(
            self,
            Self::CaptureDetected
                | Self::FullscreenExit
                | Self::PrintAttempt
                | Self::DownloadAttempt
                | Self::View
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown audit action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for AuditAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

// ============================================================================
// Events and queries
// ============================================================================

/// One immutable access event. `id` is assigned by the backend on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub doc_id: String,
    pub session_id: Option<String>,
    pub client: Option<String>,
    pub user_agent: Option<String>,
    pub action: AuditAction,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Optional facts attached to a recorded event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditContext {
    pub session_id: Option<String>,
    pub client: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<Value>,
}

impl AuditContext {
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_client(mut self, client: Option<&str>, user_agent: Option<&str>) -> Self {
        self.client = client.map(str::to_string);
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            action: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQuery {
    pub fn action(action: AuditAction) -> Self {
        Self {
            action: Some(action),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousClient {
    pub client: String,
    pub count: u64,
}
