//! Session configuration.
//!
//! Only the credential comes from the environment; every other field starts
//! from a fixed constant and changes only through an explicit override.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::error::LLMError;

/// Environment variable holding the OpenRouter API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Root of the OpenRouter OpenAI-compatible API.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct";

/// Keeps replies within free-tier limits.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Everything needed to talk to the remote chat capability.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    api_key: String,
    pub base_url: String,
    pub model: String,
    pub stream: bool,
    pub max_tokens: u32,
    pub system: String,
}

impl SessionConfig {
    /// Builds a configuration with the fixed defaults around `api_key`.
    ///
    /// Fails with [`LLMError::AbsentCredential`] when the key is empty or
    /// only whitespace.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LLMError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LLMError::AbsentCredential(API_KEY_ENV.to_string()));
        }
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            stream: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    /// Reads the credential from the process environment.
    pub fn from_env() -> Result<Self, LLMError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the credential through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LLMError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(API_KEY_ENV) {
            Some(key) => Self::new(key),
            None => Err(LLMError::AbsentCredential(API_KEY_ENV.to_string())),
        }
    }

    /// Reads the credential from `lookup` and, only when it has none, from a
    /// dotenv file. See [`read_env_file`] for how the file is found.
    pub fn from_lookup_or_file<F>(lookup: F, env_file: Option<&Path>) -> Result<Self, LLMError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match Self::from_lookup(&lookup) {
            Err(LLMError::AbsentCredential(_)) => {
                let vars = read_env_file(env_file)?;
                Self::from_lookup(|key| vars.get(key).cloned())
            }
            resolved => resolved,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Set the API root
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model identifier
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Enable or disable streamed replies
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the maximum reply length, in tokens
    pub fn max_tokens(mut self, max_tokens: u32) -> Result<Self, LLMError> {
        if max_tokens == 0 {
            return Err(LLMError::ConfigError(
                "max_tokens must be a positive integer".to_string(),
            ));
        }
        self.max_tokens = max_tokens;
        Ok(self)
    }

    /// Set the system instruction sent with every turn
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &"x".repeat(self.api_key.len()))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("max_tokens", &self.max_tokens)
            .field("system", &self.system)
            .finish()
    }
}

/// Reads a dotenv file into a map without touching the process environment.
///
/// With `path` set the file must exist and parse. Without it `.env` is
/// searched from the working directory upwards; a missing file yields an
/// empty map and unparsable lines are skipped with a warning.
pub fn read_env_file(path: Option<&Path>) -> Result<HashMap<String, String>, LLMError> {
    match path {
        Some(path) => {
            let iter = dotenvy::from_path_iter(path).map_err(|e| {
                LLMError::ConfigError(format!("Failed to read {}: {e}", path.display()))
            })?;
            collect_env_vars(iter, true)
        }
        None => match dotenvy::dotenv_iter() {
            Ok(iter) => collect_env_vars(iter, false),
            Err(e) if e.not_found() => {
                log::debug!("no .env file found");
                Ok(HashMap::new())
            }
            Err(e) => {
                log::warn!("ignoring .env: {e}");
                Ok(HashMap::new())
            }
        },
    }
}

fn collect_env_vars<R: Read>(
    iter: dotenvy::Iter<R>,
    strict: bool,
) -> Result<HashMap<String, String>, LLMError> {
    let mut vars = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) if strict => {
                return Err(LLMError::ConfigError(format!("Invalid .env entry: {e}")));
            }
            Err(dotenvy::Error::Io(e)) => {
                log::warn!("stopped reading .env: {e}");
                break;
            }
            Err(e) => log::warn!("skipping .env entry: {e}"),
        }
    }
    log::debug!("loaded {} variables from env file", vars.len());
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_credential_is_absent() {
        let err = SessionConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, LLMError::AbsentCredential(var) if var == API_KEY_ENV));
    }

    #[test]
    fn test_empty_or_blank_credential_is_absent() {
        for value in ["", "   ", "\t\n"] {
            let err = SessionConfig::from_lookup(|_| Some(value.to_string())).unwrap_err();
            assert!(
                matches!(err, LLMError::AbsentCredential(_)),
                "value {value:?} should be treated as absent"
            );
        }
    }

    #[test]
    fn test_present_credential_uses_fixed_defaults() {
        let config = SessionConfig::from_lookup(|key| {
            (key == API_KEY_ENV).then(|| "sk-or-v1-abc".to_string())
        })
        .unwrap();

        assert_eq!(config.api_key(), "sk-or-v1-abc");
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.model, "mistralai/mistral-7b-instruct");
        assert!(config.stream);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.system, "You are a helpful AI assistant.");
    }

    #[test]
    fn test_overrides() {
        let config = SessionConfig::new("key")
            .unwrap()
            .model("openai/gpt-4o-mini")
            .stream(false)
            .system("Answer in French.")
            .base_url("http://localhost:8080/v1")
            .max_tokens(256)
            .unwrap();

        assert_eq!(config.model, "openai/gpt-4o-mini");
        assert!(!config.stream);
        assert_eq!(config.system, "Answer in French.");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.max_tokens, 256);

        assert!(matches!(
            SessionConfig::new("key").unwrap().max_tokens(0),
            Err(LLMError::ConfigError(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = SessionConfig::new("sk-secret").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("xxxxxxxxx"));
    }

    #[test]
    fn test_read_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# credentials").unwrap();
        writeln!(file, "OPENROUTER_API_KEY=sk-from-file").unwrap();
        writeln!(file, "OTHER=\"quoted value\"").unwrap();
        drop(file);

        let vars = read_env_file(Some(path.as_path())).unwrap();
        assert_eq!(vars.get(API_KEY_ENV).map(String::as_str), Some("sk-from-file"));
        assert_eq!(vars.get("OTHER").map(String::as_str), Some("quoted value"));

        let config = SessionConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.api_key(), "sk-from-file");
    }

    fn write_env(lines: &[&str]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, path)
    }

    #[test]
    fn test_searched_env_file_skips_bad_lines() {
        let (_dir, path) = write_env(&[
            "OPENROUTER_API_KEY=sk-file",
            "this line is not valid",
            "AFTER=kept",
        ]);

        let iter = dotenvy::from_path_iter(&path).unwrap();
        let vars = collect_env_vars(iter, false).unwrap();
        assert_eq!(vars.get(API_KEY_ENV).map(String::as_str), Some("sk-file"));
        assert_eq!(vars.get("AFTER").map(String::as_str), Some("kept"));
    }

    #[test]
    fn test_explicit_env_file_rejects_bad_lines() {
        let (_dir, path) = write_env(&["OPENROUTER_API_KEY=sk-file", "this line is not valid"]);
        let err = read_env_file(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, LLMError::ConfigError(_)));
    }

    #[test]
    fn test_environment_wins_over_broken_env_file() {
        let (_dir, path) = write_env(&["OPENROUTER_API_KEY=sk-file", "this line is not valid"]);
        let config = SessionConfig::from_lookup_or_file(
            |key| (key == API_KEY_ENV).then(|| "sk-env".to_string()),
            Some(path.as_path()),
        )
        .unwrap();
        assert_eq!(config.api_key(), "sk-env");
    }

    #[test]
    fn test_env_file_fills_in_missing_credential() {
        let (_dir, path) = write_env(&["OPENROUTER_API_KEY=sk-file"]);
        let config = SessionConfig::from_lookup_or_file(|_| None, Some(path.as_path())).unwrap();
        assert_eq!(config.api_key(), "sk-file");

        let (_dir, empty) = write_env(&["OTHER=1"]);
        let err = SessionConfig::from_lookup_or_file(|_| None, Some(empty.as_path())).unwrap_err();
        assert!(matches!(err, LLMError::AbsentCredential(_)));
    }

    #[test]
    fn test_read_env_file_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_env_file(Some(dir.path().join("nope.env").as_path())).unwrap_err();
        assert!(matches!(err, LLMError::ConfigError(_)));
    }
}
