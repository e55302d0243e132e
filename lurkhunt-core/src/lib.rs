pub mod cache;
pub mod conductor;
pub mod config;
pub mod credentials;
pub mod enumerator;
pub mod error;
pub mod fetcher;
pub mod irc;
pub mod logging;
pub mod models;
pub mod queue;
pub mod repository;
pub mod twitch;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
