use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Governs what happens to the telephony leg when the AI leg closes first.
///
/// A telephony-side close always ends the AI leg. The reverse direction is
/// policy: `Asymmetric` keeps the telephony leg open (relaying simply stops),
/// `Symmetric` ends the whole call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownPolicy {
    Asymmetric,
    Symmetric,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub voice: String,
    pub instructions: String,
    pub teardown_policy: TeardownPolicy,
    pub log_level: Level,
}

const DEFAULT_PORT: u16 = 5050;
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_INSTRUCTIONS: &str = "You are a friendly and upbeat AI voice assistant. \
    Keep your answers brief and conversational; you are talking to someone on a phone call. \
    Be warm, stay positive, and offer more detail only when asked.";

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), e.to_string()))?,
            Err(_) => DEFAULT_PORT,
        };
        let bind_address = SocketAddr::from(([0, 0, 0, 0], port));

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let voice = std::env::var("VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());
        let instructions = std::env::var("SYSTEM_INSTRUCTIONS")
            .unwrap_or_else(|_| DEFAULT_INSTRUCTIONS.to_string());

        let policy_str =
            std::env::var("TEARDOWN_POLICY").unwrap_or_else(|_| "asymmetric".to_string());
        let teardown_policy = match policy_str.to_lowercase().as_str() {
            "asymmetric" => TeardownPolicy::Asymmetric,
            "symmetric" => TeardownPolicy::Symmetric,
            other => {
                return Err(ConfigError::InvalidValue(
                    "TEARDOWN_POLICY".to_string(),
                    format!("'{}' is not 'asymmetric' or 'symmetric'", other),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            voice,
            instructions,
            teardown_policy,
            log_level,
        })
    }
}
