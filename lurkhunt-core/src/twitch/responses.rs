use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::category::{Category, NO_CATEGORY_ID, NO_CATEGORY_NAME};

/// Accept either a JSON number or a numeric string. The platform has been
/// observed serving `viewer_count` both ways.
fn int_in_string_tolerant<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(s) => s.parse::<i64>().map_err(serde::de::Error::custom),
    }
}

/// One closure from `GET /helix/streams`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchStream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    /// `"live"` for a live broadcast; empty in rare error cases.
    #[serde(rename = "type")]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(deserialize_with = "int_in_string_tolerant")]
    pub viewer_count: i64,
    pub started_at: DateTime<Utc>,
    pub language: String,
    #[serde(default)]
    pub is_mature: bool,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

impl TwitchStream {
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.stream_type == "live"
    }

    #[must_use]
    pub fn stream_id_i64(&self) -> i64 {
        self.id.parse().unwrap_or_default()
    }

    #[must_use]
    pub fn user_id_i64(&self) -> i64 {
        self.user_id.parse().unwrap_or_default()
    }

    /// Category id, or the unset sentinel when the streamer left it blank.
    #[must_use]
    pub fn category_id_i64(&self) -> i64 {
        if self.game_id.is_empty() {
            NO_CATEGORY_ID
        } else {
            self.game_id.parse().unwrap_or(NO_CATEGORY_ID)
        }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        if self.game_id.is_empty() {
            Category::unset()
        } else {
            Category::new(
                self.category_id_i64(),
                if self.game_name.is_empty() {
                    NO_CATEGORY_NAME
                } else {
                    &self.game_name
                },
            )
        }
    }
}

/// One record from `GET /helix/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    /// `staff`, `admin`, `global_mod`, or empty for a normal user.
    #[serde(rename = "type")]
    pub account_type: String,
    /// `partner`, `affiliate`, or empty for a normal user.
    pub broadcaster_type: String,
    pub created_at: DateTime<Utc>,
}

/// One record from `GET /helix/games`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamsEnvelope {
    pub data: Vec<TwitchStream>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersEnvelope {
    pub data: Vec<TwitchUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoriesEnvelope {
    pub data: Vec<TwitchCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM_JSON: &str = r#"{
        "id": "123456789",
        "user_id": "98765",
        "user_login": "sandysanderman",
        "user_name": "SandySanderman",
        "game_id": "494131",
        "game_name": "Little Nightmares",
        "type": "live",
        "title": "hablamos y le damos a Little Nightmares 1",
        "viewer_count": 78365,
        "started_at": "2021-03-10T15:04:21Z",
        "language": "es",
        "thumbnail_url": "https://blah-blah-blah.jpg",
        "tag_ids": [],
        "is_mature": false
    }"#;

    #[test]
    fn test_stream_parses_documented_shape() {
        let stream: TwitchStream = serde_json::from_str(STREAM_JSON).expect("stream parses");
        assert_eq!(stream.stream_id_i64(), 123_456_789);
        assert_eq!(stream.user_id_i64(), 98_765);
        assert_eq!(stream.category_id_i64(), 494_131);
        assert_eq!(stream.viewer_count, 78_365);
        assert_eq!(stream.language, "es");
        assert!(stream.is_live());
        assert!(!stream.is_mature);
    }

    #[test]
    fn test_viewer_count_tolerates_string() {
        let json = STREAM_JSON.replace("78365", "\"78365\"");
        let stream: TwitchStream = serde_json::from_str(&json).expect("string count parses");
        assert_eq!(stream.viewer_count, 78_365);
    }

    #[test]
    fn test_viewer_count_rejects_garbage_string() {
        let json = STREAM_JSON.replace("78365", "\"lots\"");
        assert!(serde_json::from_str::<TwitchStream>(&json).is_err());
    }

    #[test]
    fn test_unset_category_maps_to_sentinel() {
        let json = STREAM_JSON
            .replace("\"494131\"", "\"\"")
            .replace("Little Nightmares", "");
        let stream: TwitchStream = serde_json::from_str(&json).expect("parses");
        assert_eq!(stream.category_id_i64(), NO_CATEGORY_ID);
        assert_eq!(stream.category(), Category::unset());
    }

    #[test]
    fn test_user_parses() {
        let user: TwitchUser = serde_json::from_str(
            r#"{
                "id": "141981764",
                "login": "twitchdev",
                "display_name": "TwitchDev",
                "type": "",
                "broadcaster_type": "partner",
                "created_at": "2016-12-14T20:32:28Z"
            }"#,
        )
        .expect("user parses");
        assert_eq!(user.login, "twitchdev");
        assert_eq!(user.account_type, "");
        assert_eq!(user.broadcaster_type, "partner");
    }
}
