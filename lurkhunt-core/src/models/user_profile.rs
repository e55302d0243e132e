use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Twitch account spotted during scans, as streamer or viewer.
///
/// Rows are created partial the first time a login is seen (often just the
/// account id and login name from a stream descriptor) and filled in later by
/// the user-data enricher. `twitch_account_id` persists across login renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub twitch_account_id: i64,
    pub login_name: String,
    pub display_name: Option<String>,
    /// `staff`, `admin`, `global_mod`, or empty for a normal user.
    pub account_type: String,
    /// `partner`, `affiliate`, or empty for a normal user.
    pub broadcaster_type: String,
    pub account_created_at: Option<DateTime<Utc>>,
    pub first_seen_as_viewer: Option<DateTime<Utc>>,
    pub last_seen_as_viewer: Option<DateTime<Utc>>,
    pub most_recent_concurrent_channels: i32,
    pub all_time_high_concurrent_channels: i32,
    pub all_time_high_at: Option<DateTime<Utc>>,
    pub enriched: bool,
}

impl UserProfile {
    /// The minimal row written when a channel owner is first sighted, before
    /// the enricher has fetched full account data.
    pub fn partial(twitch_account_id: i64, login_name: impl Into<String>) -> Self {
        Self {
            twitch_account_id,
            login_name: login_name.into(),
            display_name: None,
            account_type: String::new(),
            broadcaster_type: String::new(),
            account_created_at: None,
            first_seen_as_viewer: None,
            last_seen_as_viewer: None,
            most_recent_concurrent_channels: 0,
            all_time_high_concurrent_channels: 0,
            all_time_high_at: None,
            enriched: false,
        }
    }
}
