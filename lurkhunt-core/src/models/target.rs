use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::twitch::TwitchStream;

/// The queue envelope moved from the pending queue to the workbench.
///
/// The stream descriptor is the raw Helix closure; the scan id rides along so
/// workers can stamp fetch rows without any other shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTarget {
    pub scan_id: Uuid,
    pub stream: TwitchStream,
}

impl StreamTarget {
    pub const fn new(scan_id: Uuid, stream: TwitchStream) -> Self {
        Self { scan_id, stream }
    }

    /// The channel to join, lowercased the way chat expects.
    #[must_use]
    pub fn channel_name(&self) -> String {
        self.stream.user_login.to_lowercase()
    }
}
