pub mod category;
pub mod credential;
pub mod fetch;
pub mod scan;
pub mod sighting;
pub mod target;
pub mod user_profile;

pub use category::Category;
pub use credential::{CredentialRow, ScopeField, TokenPayload};
pub use fetch::{Fetch, FetchStatus};
pub use scan::{Scan, StopReason};
pub use sighting::ViewerSighting;
pub use target::StreamTarget;
pub use user_profile::UserProfile;
