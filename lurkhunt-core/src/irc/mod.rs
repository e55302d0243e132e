//! Chat-side collection: join a channel, read the anonymous chatter-list
//! numerics, leave.
//!
//! The protocol surface is tiny. Only two numerics matter: `353` carries a
//! page of the channel's name list, `366` says the list is finished. JOIN
//! echoes fill in stragglers. Everything else on the wire is ignored.

pub mod listener;
pub mod message;
pub mod transport;

pub use listener::{ChannelFetchData, ChannelListener};
pub use message::{parse_line, split_frame, IrcEvent};
pub use transport::{IrcConnection, TcpIrcConnection};

use thiserror::Error;

/// Numeric reply carrying a page of a channel's name list (RFC 1459).
pub const NAMES_LIST_NUMERIC: &str = "353";
/// Numeric reply terminating the name list.
pub const END_OF_NAMES_NUMERIC: &str = "366";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetcherError {
    #[error("Failed to join channel: {0}")]
    Join(String),

    #[error("Failed to part channel: {0}")]
    Part(String),

    /// The channel did not finish its name list inside the per-channel
    /// deadline and was abandoned in place.
    #[error("Channel exceeded the fetch deadline")]
    Overtime,

    #[error("Chat authentication failed: {0}")]
    Auth(String),

    #[error("Chat transport error: {0}")]
    Transport(String),

    /// Every channel in the batch failed at the connection level.
    #[error("All channels in the batch failed")]
    BatchFailed,
}
