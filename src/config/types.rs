use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pty::{BridgeConfig, SpawnSpec, DEFAULT_OUTPUT_BUFFER, DEFAULT_POLL_INTERVAL};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub command: CommandConfig,
}

/// Socket server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the listener (host:port).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Close each session after this many seconds. Unset means no limit.
    #[serde(default)]
    pub session_timeout_secs: Option<u64>,
    /// How long shutdown waits for open sessions, in seconds (default: 5).
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

/// Poll loop settings applied to every bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Milliseconds between engine polls (default: 50).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Output chunks buffered before polling pauses (default: 8).
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,
}

/// Command spawned for every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Empty when omitted; the platform shell's default args only apply
    /// when the whole `[command]` section is absent.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:6666".to_string()
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_output_buffer() -> usize {
    DEFAULT_OUTPUT_BUFFER
}

fn default_program() -> String {
    if cfg!(windows) {
        "cmd".to_string()
    } else {
        "sh".to_string()
    }
}

/// `cmd` is switched to the UTF-8 code page so output decodes cleanly.
fn default_args() -> Vec<String> {
    if cfg!(windows) {
        vec!["/k".to_string(), "chcp 65001".to_string()]
    } else {
        Vec::new()
    }
}

fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([("TERM".to_string(), "xterm".to_string())])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            session_timeout_secs: None,
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            output_buffer: default_output_buffer(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            env: default_env(),
        }
    }
}

impl From<&BridgeSettings> for BridgeConfig {
    fn from(settings: &BridgeSettings) -> Self {
        BridgeConfig {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            output_buffer: settings.output_buffer,
        }
    }
}

impl CommandConfig {
    pub fn spawn_spec(&self) -> SpawnSpec {
        SpawnSpec::new(self.program.clone())
            .args(self.args.iter().cloned())
            .envs(self.env.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}

impl ServerConfig {
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_secs.map(Duration::from_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
