use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Ringing,
    Connected,
    Ended,
}

impl CallState {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Ended)
    }
}

/// Why a call reached `ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Busy,
    Declined,
    Hangup,
    Disconnected,
}

/// Caller profile shown to the callee while ringing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerInfo {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}
