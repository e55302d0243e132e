pub mod category;
pub mod credential;
pub mod fetch;
pub mod scan;
pub mod sighting;
pub mod user_profile;

pub use category::CategoryRepository;
pub use credential::CredentialRepository;
pub use fetch::FetchRepository;
pub use scan::ScanRepository;
pub use sighting::SightingRepository;
pub use user_profile::UserProfileRepository;
