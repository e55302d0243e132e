use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a scan stopped. `InProgress` is the non-terminal sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    InProgress,
    Complete,
    Cancelled,
    Errored,
}

impl StopReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "cancelled" => Some(Self::Cancelled),
            "errored" => Some(Self::Errored),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One bounded pass over the live-stream population.
///
/// Created by the scan conductor before any stream is enumerated and mutated
/// only by the conductor; terminal once `stop_reason` leaves `in_progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stop_reason: StopReason,
    pub streams_targeted: i64,
    pub viewerlists_fetched: i64,
    pub error_count: i64,
}

impl Scan {
    /// A fresh scan record, not yet persisted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            stop_reason: StopReason::InProgress,
            streams_targeted: 0,
            viewerlists_fetched: 0,
            error_count: 0,
        }
    }
}

impl Default for Scan {
    fn default() -> Self {
        Self::new()
    }
}
