//! # Configuration Management
//!
//! Loads and manages gateway configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub engine: EngineConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio framing configuration.
///
/// ## Fields:
/// - `default_sample_rate`: Used when a start command omits the sample rate
/// - `chunk_duration_ms`: How much audio each recognition call consumes;
///   smaller chunks lower latency but call the engine more often
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub default_sample_rate: u32,
    pub chunk_duration_ms: u32,
}

/// Recognition engine backend configuration.
///
/// The acoustic model itself lives behind the `RecognitionEngine` trait;
/// this block selects and parameterizes the backend at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend selector ("stub" is the only built-in backend)
    pub backend: String,

    /// Model identifier or path handed to the backend
    pub model_path: String,

    /// Inference device ("cpu" or a backend-specific identifier)
    pub device: String,

    /// Silence span after which a sentence is considered ended (ms)
    pub max_sentence_silence: u32,

    /// Whether the backend should load a separate punctuation model
    pub enable_punctuation_model: bool,

    /// Response mode used when a start command omits one
    pub default_response_mode: String,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Soft ceiling on concurrently registered sessions, reported by the
    /// health endpoint for capacity monitoring
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                default_sample_rate: 16000,
                chunk_duration_ms: 100,
            },
            engine: EngineConfig {
                backend: "stub".to_string(),
                model_path: "paraformer-zh-streaming".to_string(),
                device: "cpu".to_string(),
                max_sentence_silence: 800,
                enable_punctuation_model: false,
                default_response_mode: "fast".to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `APP_ENGINE_BACKEND=stub`: Override engine backend
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.default_sample_rate == 0 {
            return Err(anyhow::anyhow!("Default sample rate must be greater than 0"));
        }

        if self.audio.chunk_duration_ms == 0 {
            return Err(anyhow::anyhow!("Chunk duration must be greater than 0"));
        }

        if self.engine.backend.is_empty() {
            return Err(anyhow::anyhow!("Engine backend must be set"));
        }

        if self
            .engine
            .default_response_mode
            .parse::<crate::recognition::ResponseMode>()
            .is_err()
        {
            return Err(anyhow::anyhow!(
                "Default response mode must be one of fast, balanced, accurate"
            ));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!(
                "Max concurrent sessions must be greater than 0"
            ));
        }

        Ok(())
    }

    /// Apply a partial update from a JSON string (runtime config updates).
    ///
    /// Only the fields present in the JSON are changed; the result is
    /// re-validated before being accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial.get("audio") {
            if let Some(rate) = audio.get("default_sample_rate").and_then(|v| v.as_u64()) {
                self.audio.default_sample_rate = rate as u32;
            }
            if let Some(chunk) = audio.get("chunk_duration_ms").and_then(|v| v.as_u64()) {
                self.audio.chunk_duration_ms = chunk as u32;
            }
        }

        if let Some(engine) = partial.get("engine") {
            if let Some(silence) = engine.get("max_sentence_silence").and_then(|v| v.as_u64()) {
                self.engine.max_sentence_silence = silence as u32;
            }
            if let Some(mode) = engine.get("default_response_mode").and_then(|v| v.as_str()) {
                self.engine.default_response_mode = mode.to_string();
            }
        }

        if let Some(performance) = partial.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
