use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
        }
    }

    /// Stored statuses are free-form text; anything unknown reads as online.
    pub fn from_stored(raw: &str) -> Self {
        match raw {
            "away" => Self::Away,
            _ => Self::Online,
        }
    }
}

/// One entry of the online list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stored_status_reads_as_online() {
        assert_eq!(PresenceStatus::from_stored("away"), PresenceStatus::Away);
        assert_eq!(PresenceStatus::from_stored("offline"), PresenceStatus::Online);
    }

    #[test]
    fn presence_user_uses_camel_case() {
        let user = PresenceUser {
            user_id: "u1".into(),
            name: "Ada".into(),
            avatar_url: None,
            status: PresenceStatus::Away,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["status"], "away");
    }
}
