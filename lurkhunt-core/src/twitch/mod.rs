//! Thin outbound client for the platform's REST endpoints.
//!
//! Response models are kept bit-exact with the Helix wire shapes; all the
//! domain mapping happens in the callers.

pub mod delegate;
pub mod responses;

pub use delegate::{
    get_categories, get_streams, get_users, refresh_token, validate_token, ApiError, StreamsQuery,
    TwitchApiConfig,
};
pub use responses::{TwitchCategory, TwitchStream, TwitchUser};
