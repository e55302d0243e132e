use serde::{Deserialize, Serialize};

/// Streamers can leave the category unset, on purpose or by accident.
pub const NO_CATEGORY_ID: i64 = -1;
pub const NO_CATEGORY_NAME: &str = "category unset";

/// A streaming category ("game"), tracked for cross-referencing in queries.
/// Includes non-game categories such as "Art" and "Just Chatting".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub category_name: String,
}

impl Category {
    pub fn new(category_id: i64, category_name: impl Into<String>) -> Self {
        Self {
            category_id,
            category_name: category_name.into(),
        }
    }

    /// The sentinel row for streams with no category set.
    #[must_use]
    pub fn unset() -> Self {
        Self::new(NO_CATEGORY_ID, NO_CATEGORY_NAME)
    }
}
