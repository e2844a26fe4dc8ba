//! Bot credential registry
//!
//! Stores login state for any number of named bot endpoints, performs the
//! login/refresh token handshakes against them and derives the per-bot API
//! and websocket URLs.

pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod storage;
pub mod types;
pub mod urls;

pub use config::ClientConfig;
pub use error::{BotAuthError, Result};
pub use registry::BotRegistry;
pub use session::BotSession;
pub use types::{AuthRecord, BotDescriptor, LoginCredentials, RecordUpdate};
