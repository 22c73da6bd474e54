use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HISTORY_CONTEXT: usize = 10;
pub const DEFAULT_INTERPRETER_TIMEOUT_SECS: u64 = 30;

/// Contents of `config.toml`. Every section and field is optional.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RootConfig {
    pub store: StoreConfig,
    pub locks: LockConfig,
    pub router: RouterConfig,
    pub interpreter: InterpreterConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub command_timeout_secs: u64,
    pub confirm_interpreted_mutations: bool,
    /// Number of recent entries handed to the interpreter
    pub history_context: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            confirm_interpreted_mutations: true,
            history_context: DEFAULT_HISTORY_CONTEXT,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Base URL of an OpenAI-compatible API. Rules only when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: DEFAULT_INTERPRETER_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: RootConfig = toml::from_str("").unwrap();
        assert_eq!(config, RootConfig::default());
        assert_eq!(config.locks.ttl_secs, 300);
        assert_eq!(config.router.command_timeout_secs, 10);
        assert!(config.router.confirm_interpreted_mutations);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: RootConfig = toml::from_str(
            r#"
            [router]
            confirm_interpreted_mutations = false

            [interpreter]
            endpoint = "http://localhost:11434/v1"
            model = "llama3"
            "#,
        )
        .unwrap();
        assert!(!config.router.confirm_interpreted_mutations);
        assert_eq!(config.router.history_context, 10);
        assert_eq!(
            config.interpreter.endpoint.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.interpreter.api_key_env, "OPENAI_API_KEY");
    }
}
