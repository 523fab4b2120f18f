use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::Config;
use crate::pty::SpawnSpec;

#[derive(Debug, Parser)]
#[command(name = "ptystream", version, about = "Serve PTY sessions over TCP")]
pub struct Cli {
    /// Config file (default: <config dir>/ptystream/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:6666
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Close each session after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Milliseconds between PTY polls
    #[arg(long = "poll-interval", value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Extra environment variable for the child (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// JSON spawn request: {"cmd": ..., "args": [...], "env": [[k, v], ...]}
    #[arg(long, value_name = "FILE", conflicts_with = "command")]
    pub spec: Option<PathBuf>,

    /// Command to run in each session
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl Cli {
    /// Load the config file and apply command-line overrides on top.
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config.clone().unwrap_or_else(Config::config_path);
        let mut config = Config::load_from(&path)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.server.bind_addr = bind.clone();
        }
        if let Some(timeout) = self.timeout {
            config.server.session_timeout_secs = Some(timeout);
        }
        if let Some(interval) = self.poll_interval {
            config.bridge.poll_interval_ms = interval;
        }
        if let Some((program, args)) = self.command.split_first() {
            config.command.program = program.clone();
            config.command.args = args.to_vec();
        }
        for (key, value) in &self.env {
            config.command.env.insert(key.clone(), value.clone());
        }
    }

    /// Spawn request read from `--spec`, with `--env` values layered on.
    pub fn spawn_override(&self) -> Result<Option<SpawnSpec>> {
        let Some(path) = &self.spec else {
            return Ok(None);
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read spawn spec '{}'", path.display()))?;
        let spec = SpawnSpec::from_json(&json)
            .with_context(|| format!("Failed to parse spawn spec '{}'", path.display()))?;
        Ok(Some(spec.envs(self.env.iter().cloned())))
    }
}
