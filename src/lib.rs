//! Attache library root.

pub mod actions;
pub mod agents;
pub mod board;
pub mod cli;
pub mod config;
pub mod directives;
pub mod error;
pub mod lock;
pub mod logging;
pub mod models;
pub mod providers;
pub mod relay;
pub mod session;
pub mod store;
pub mod usage;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use relay::{Relay, RelayReply};
pub use providers::{Provider, ProviderRouter};
