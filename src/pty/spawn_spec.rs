use serde::{Deserialize, Serialize};

/// Command to run inside a new PTY session.
///
/// Immutable once handed to a bridge. Serializes to the engine request
/// form: `{"cmd": "...", "args": [...], "env": [["KEY", "VALUE"], ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnSpec {
    #[serde(rename = "cmd", alias = "command")]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    /// Ordered name/value pairs. Names are unique.
    #[serde(default, deserialize_with = "dedup_env")]
    env: Vec<(String, String)>,
}

impl SpawnSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    ///
    /// Setting a name that is already present replaces its value in place,
    /// so the original ordering is kept.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_env(&mut self.env, key.into(), value.into());
        self
    }

    #[must_use]
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            set_env(&mut self.env, key.into(), value.into());
        }
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    /// Encode as the JSON request an engine expects.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode from the JSON request form. `command` is accepted as an
    /// alias for `cmd`; missing `args`/`env` default to empty.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn set_env(env: &mut Vec<(String, String)>, key: String, value: String) {
    match env.iter_mut().find(|(name, _)| *name == key) {
        Some(entry) => entry.1 = value,
        None => env.push((key, value)),
    }
}

fn dedup_env<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
    let mut env = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        set_env(&mut env, key, value);
    }
    Ok(env)
}
