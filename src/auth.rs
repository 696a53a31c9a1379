use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable consulted when nothing else is configured.
pub const DEFAULT_KEY_ENV: &str = "OPENAI_API_KEY";

/// Looks up an environment variable by name.
pub type EnvLookup = fn(&str) -> Option<String>;

pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Where the API key should come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// The value stored in the config file.
    #[default]
    Stored,
    /// A named environment variable.
    Env,
}

impl std::str::FromStr for KeySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stored" => Ok(KeySource::Stored),
            "env" | "environment" => Ok(KeySource::Env),
            other => Err(format!("unknown key source: {other} (expected `stored` or `env`)")),
        }
    }
}

/// Credential preferences as owned by the config layer. Read-only here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPreferences {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub key_source: KeySource,
    pub key_env: String,
}

impl Default for KeyPreferences {
    fn default() -> Self {
        Self {
            key: String::new(),
            key_source: KeySource::Stored,
            key_env: DEFAULT_KEY_ENV.to_string(),
        }
    }
}

impl fmt::Debug for KeyPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.key.is_empty() {
            "(empty)".to_string()
        } else {
            Credential::new(self.key.as_str()).masked()
        };
        f.debug_struct("KeyPreferences")
            .field("key", &format_args!("{key}"))
            .field("key_source", &self.key_source)
            .field("key_env", &self.key_env)
            .finish()
    }
}

impl KeyPreferences {
    pub fn resolve(&self) -> Option<Credential> {
        self.resolve_with(process_env)
    }

    /// Resolve the API key.
    ///
    /// - `Stored`: the stored key, else the configured variable.
    /// - `Env`: the configured variable, else `OPENAI_API_KEY` when the
    ///   configured name is a different one.
    ///
    /// Every candidate is trimmed; blank values count as missing.
    pub fn resolve_with(&self, env: EnvLookup) -> Option<Credential> {
        let env_name = self.env_name();
        let read = |name: &str| env(name).map(|v| v.trim().to_string()).unwrap_or_default();

        let value = match self.key_source {
            KeySource::Stored => {
                let stored = self.key.trim();
                if stored.is_empty() {
                    read(env_name)
                } else {
                    stored.to_string()
                }
            }
            KeySource::Env => {
                let v = read(env_name);
                if v.is_empty() && env_name != DEFAULT_KEY_ENV {
                    read(DEFAULT_KEY_ENV)
                } else {
                    v
                }
            }
        };

        if value.is_empty() {
            None
        } else {
            Some(Credential(value))
        }
    }

    fn env_name(&self) -> &str {
        let name = self.key_env.trim();
        if name.is_empty() {
            DEFAULT_KEY_ENV
        } else {
            name
        }
    }
}

/// A bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length and last four characters, for diagnostics.
    pub fn masked(&self) -> String {
        let tail: String = {
            let mut t: Vec<char> = self.0.chars().rev().take(4).collect();
            t.reverse();
            t.into_iter().collect()
        };
        format!("len={} ...{tail}", self.0.chars().count())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.masked())
    }
}
