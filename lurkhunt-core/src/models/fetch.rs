use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::twitch::TwitchStream;

/// Lifecycle of a single viewer-list fetch.
///
/// Transitions are strictly monotonic along
/// `pending -> in_queue -> waiting_on_viewer_list -> (complete | errored)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Targeted for the scan but not yet handed to a worker.
    Pending,
    /// Picked up off the workbench by a worker.
    InQueue,
    /// The worker's listener is in the channel.
    WaitingOnViewerList,
    Complete,
    Errored,
}

impl FetchStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InQueue => "in_queue",
            Self::WaitingOnViewerList => "waiting_on_viewer_list",
            Self::Complete => "complete",
            Self::Errored => "errored",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_queue" => Some(Self::InQueue),
            "waiting_on_viewer_list" => Some(Self::WaitingOnViewerList),
            "complete" => Some(Self::Complete),
            "errored" => Some(Self::Errored),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }

    /// Whether moving from `self` to `next` follows the legal order.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InQueue)
                | (Self::InQueue, Self::WaitingOnViewerList)
                | (Self::WaitingOnViewerList, Self::Complete)
                | (Self::WaitingOnViewerList, Self::Errored)
        )
    }
}

/// One attempt to collect the viewer list from one channel during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fetch {
    pub fetch_id: Uuid,
    pub scan_id: Uuid,
    pub channel_owner_id: i64,
    pub category_id: i64,
    pub stream_id: i64,
    pub viewer_count: i64,
    pub stream_started_at: DateTime<Utc>,
    pub language: String,
    pub is_mature: bool,
    pub was_live: bool,
    pub status: FetchStatus,
    pub fetch_action_at: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
}

impl Fetch {
    /// Build a fetch row from a dequeued stream descriptor. Workers call this
    /// with [`FetchStatus::InQueue`] the moment they pick a target up.
    pub fn from_stream(scan_id: Uuid, stream: &TwitchStream, status: FetchStatus) -> Self {
        Self {
            fetch_id: Uuid::new_v4(),
            scan_id,
            channel_owner_id: stream.user_id_i64(),
            category_id: stream.category_id_i64(),
            stream_id: stream.stream_id_i64(),
            viewer_count: stream.viewer_count,
            stream_started_at: stream.started_at,
            language: stream.language.clone(),
            is_mature: stream.is_mature,
            was_live: stream.is_live(),
            status,
            fetch_action_at: Utc::now(),
            duration_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use FetchStatus::*;
        assert!(Pending.can_advance_to(InQueue));
        assert!(InQueue.can_advance_to(WaitingOnViewerList));
        assert!(WaitingOnViewerList.can_advance_to(Complete));
        assert!(WaitingOnViewerList.can_advance_to(Errored));
    }

    #[test]
    fn test_illegal_transitions() {
        use FetchStatus::*;
        assert!(!Pending.can_advance_to(Complete));
        assert!(!Pending.can_advance_to(WaitingOnViewerList));
        assert!(!InQueue.can_advance_to(Pending));
        assert!(!Complete.can_advance_to(Errored));
        assert!(!Errored.can_advance_to(Complete));
        assert!(!Complete.can_advance_to(Complete));
    }

    #[test]
    fn test_terminal_states() {
        assert!(FetchStatus::Complete.is_terminal());
        assert!(FetchStatus::Errored.is_terminal());
        assert!(!FetchStatus::WaitingOnViewerList.is_terminal());
    }
}
