//! Configuration types and loading
//!
//! The configuration record is immutable after startup and shared freely
//! between the dispatch loop and worker tasks.

mod loader;
mod types;

pub use loader::{load_config, load_config_str};
pub use types::{ProxyConfig, DEFAULT_BUFFER_SIZE, DEFAULT_HTTP_RESPONSE};
