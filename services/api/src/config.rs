use parley_core::{
    AgentConfig, ControllerSettings,
    config::{DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_RESPONSE_TIMEOUT_MS},
    services::openai::OpenAiModels,
};
use std::{net::SocketAddr, str::FromStr, time::Duration};
use tracing::Level;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The OpenAI-compatible backend serving transcription, chat and speech.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub speech_voice: String,
    pub log_level: Level,
    pub join_timeout: Duration,
    pub response_timeout_ms: u64,
    pub max_consecutive_failures: u32,
    pub pace_playback: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>())?;

        let provider_str =
            std::env::var("REALTIME_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REALTIME_PROVIDER".to_string(),
                    format!("'{}' is not one of 'openai', 'gemini'", other),
                ));
            }
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let defaults = OpenAiModels::default();
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or(defaults.chat);
        let transcription_model =
            std::env::var("TRANSCRIPTION_MODEL").unwrap_or(defaults.transcription);
        let speech_model = std::env::var("SPEECH_MODEL").unwrap_or(defaults.speech);
        let speech_voice = std::env::var("SPEECH_VOICE").unwrap_or(defaults.voice);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let join_timeout_ms: u64 = parse_var("JOIN_TIMEOUT_MS", Ok(5_000))?;
        let response_timeout_ms = parse_var("RESPONSE_TIMEOUT_MS", Ok(DEFAULT_RESPONSE_TIMEOUT_MS))?;
        let max_consecutive_failures =
            parse_var("MAX_CONSECUTIVE_FAILURES", Ok(DEFAULT_MAX_CONSECUTIVE_FAILURES))?;
        let pace_playback = parse_var("PACE_PLAYBACK", Ok(true))?;

        for (name, value) in [
            ("JOIN_TIMEOUT_MS", join_timeout_ms),
            ("RESPONSE_TIMEOUT_MS", response_timeout_ms),
            ("MAX_CONSECUTIVE_FAILURES", u64::from(max_consecutive_failures)),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            transcription_model,
            speech_model,
            speech_voice,
            log_level,
            join_timeout: Duration::from_millis(join_timeout_ms),
            response_timeout_ms,
            max_consecutive_failures,
            pace_playback,
        })
    }

    /// API key and base URL of the selected provider.
    pub fn provider_endpoint(&self) -> (&str, &'static str) {
        match self.provider {
            Provider::OpenAI => (
                self.openai_api_key.as_deref().unwrap_or_default(),
                OPENAI_API_BASE,
            ),
            Provider::Gemini => (
                self.gemini_api_key.as_deref().unwrap_or_default(),
                GEMINI_API_BASE,
            ),
        }
    }

    pub fn models(&self) -> OpenAiModels {
        OpenAiModels {
            chat: self.chat_model.clone(),
            transcription: self.transcription_model.clone(),
            speech: self.speech_model.clone(),
            voice: self.speech_voice.clone(),
        }
    }

    /// Server-wide defaults that per-agent configuration is layered over.
    pub fn agent_defaults(&self) -> AgentConfig {
        AgentConfig {
            response_timeout_ms: self.response_timeout_ms,
            max_consecutive_failures: self.max_consecutive_failures,
            ..Default::default()
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            join_timeout: self.join_timeout,
            pace_playback: self.pace_playback,
            ..Default::default()
        }
    }
}

/// Reads and parses `name`, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: Result<T, T::Err>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>(),
        Err(_) => default,
    };
    parsed.map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            for var in [
                "BIND_ADDRESS",
                "REALTIME_PROVIDER",
                "OPENAI_API_KEY",
                "GEMINI_API_KEY",
                "CHAT_MODEL",
                "TRANSCRIPTION_MODEL",
                "SPEECH_MODEL",
                "SPEECH_VOICE",
                "RUST_LOG",
                "JOIN_TIMEOUT_MS",
                "RESPONSE_TIMEOUT_MS",
                "MAX_CONSECUTIVE_FAILURES",
                "PACE_PLAYBACK",
            ] {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env_openai() {
        unsafe {
            env::set_var("REALTIME_PROVIDER", "openai");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal_openai() {
        clear_env_vars();
        set_minimal_env_openai();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.openai_api_key, Some("test-openai-key".to_string()));
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.transcription_model, "whisper-1");
        assert_eq!(config.speech_model, "tts-1");
        assert_eq!(config.speech_voice, "alloy");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.join_timeout, Duration::from_secs(5));
        assert_eq!(config.response_timeout_ms, 10_000);
        assert_eq!(config.max_consecutive_failures, 3);
        assert!(config.pace_playback);
        assert_eq!(config.provider_endpoint(), ("test-openai-key", OPENAI_API_BASE));
    }

    #[test]
    #[serial]
    fn test_config_from_env_gemini_provider() {
        clear_env_vars();
        unsafe {
            env::set_var("REALTIME_PROVIDER", "Gemini");
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.gemini_api_key, Some("test-gemini-key".to_string()));
        assert_eq!(config.openai_api_key, None);
        assert_eq!(config.provider_endpoint(), ("test-gemini-key", GEMINI_API_BASE));
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("CHAT_MODEL", "gpt-4o-mini");
            env::set_var("SPEECH_VOICE", "nova");
            env::set_var("RUST_LOG", "debug");
            env::set_var("JOIN_TIMEOUT_MS", "750");
            env::set_var("RESPONSE_TIMEOUT_MS", "4000");
            env::set_var("MAX_CONSECUTIVE_FAILURES", "5");
            env::set_var("PACE_PLAYBACK", "false");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.join_timeout, Duration::from_millis(750));
        assert!(!config.pace_playback);

        let defaults = config.agent_defaults();
        assert_eq!(defaults.response_timeout_ms, 4_000);
        assert_eq!(defaults.max_consecutive_failures, 5);
        assert_eq!(config.models().voice, "nova");
        assert_eq!(config.controller_settings().join_timeout, Duration::from_millis(750));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_and_garbage_timeouts() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("RESPONSE_TIMEOUT_MS", "0");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RESPONSE_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue for RESPONSE_TIMEOUT_MS"),
        }

        unsafe {
            env::set_var("RESPONSE_TIMEOUT_MS", "soon");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RESPONSE_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue for RESPONSE_TIMEOUT_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_unknown_provider() {
        clear_env_vars();
        set_minimal_env_openai();
        unsafe {
            env::set_var("REALTIME_PROVIDER", "carrier-pigeon");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "REALTIME_PROVIDER"),
            _ => panic!("Expected InvalidValue for REALTIME_PROVIDER"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();
        unsafe {
            env::set_var("REALTIME_PROVIDER", "openai");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("OPENAI_API_KEY"));
            }
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_gemini_key() {
        clear_env_vars();
        unsafe {
            env::set_var("REALTIME_PROVIDER", "gemini");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => {
                assert!(msg.contains("GEMINI_API_KEY"));
            }
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }
}
