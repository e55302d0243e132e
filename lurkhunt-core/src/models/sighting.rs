use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observation of a login name in one channel's viewer list.
///
/// Events-style and append-only: this table grows very long during a scan and
/// is pruned after aggregation, so it carries no outgoing data beyond the
/// name itself and the batch-job flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSighting {
    pub sighting_id: Uuid,
    pub fetch_id: Uuid,
    pub viewer_login_name: String,
    /// Set once the user-data enricher has processed this row.
    pub enriched: bool,
    /// Set once the concurrency aggregator has processed this row.
    pub aggregated: bool,
}

impl ViewerSighting {
    pub fn new(fetch_id: Uuid, viewer_login_name: impl Into<String>) -> Self {
        Self {
            sighting_id: Uuid::new_v4(),
            fetch_id,
            viewer_login_name: viewer_login_name.into(),
            enriched: false,
            aggregated: false,
        }
    }
}
