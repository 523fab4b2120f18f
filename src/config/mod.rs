mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{BridgeSettings, CommandConfig, Config, ServerConfig};
