//! Client configuration.
//!
//! Configuration is assembled from environment variables (with `.env` loaded
//! by the binary) and optionally a YAML file. Priority: YAML > ENV vars >
//! defaults.
//!
//! # Example YAML structure
//! ```yaml
//! service:
//!   api_key: "sk-..."
//!   model: "gpt-4o-realtime-preview"
//!   # For Azure OpenAI instead of the OpenAI endpoint:
//!   # azure_endpoint: "https://myresource.openai.azure.com"
//!   # azure_deployment: "gpt-4o-realtime-global"
//!
//! session:
//!   instructions: "You are a friendly tutor."
//!   temperature: 0.8
//!   voice: "echo"
//!
//! audio:
//!   input_device: "USB Microphone"
//!   output_device: "Speakers"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::core::protocol::Voice;
use crate::core::session::SessionSettings;
use crate::core::transport::ServiceEndpoint;
use crate::core::transport::ws::AZURE_API_VERSION;

/// Default realtime model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// API key missing from every source
    #[error("API key is required (set VOICELINK_API_KEY or service.api_key)")]
    MissingApiKey,

    /// Azure endpoint configured without a deployment
    #[error("azure_deployment is required when azure_endpoint is set")]
    MissingAzureDeployment,

    /// Could not read the configuration file
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Could not parse the configuration file
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value failed to parse
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Setting name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key for the speech service
    pub api_key: String,
    /// Realtime model (OpenAI endpoint)
    pub model: String,
    /// Azure OpenAI resource endpoint; switches the transport to Azure
    pub azure_endpoint: Option<String>,
    /// Azure deployment name (required with `azure_endpoint`)
    pub azure_deployment: Option<String>,
    /// Azure API version query parameter
    pub azure_api_version: String,
    /// System instructions for the assistant
    pub instructions: Option<String>,
    /// Temperature for response generation
    pub temperature: Option<f32>,
    /// Voice for synthesized speech
    pub voice: Option<Voice>,
    /// Input device name override
    pub input_device: Option<String>,
    /// Output device name override
    pub output_device: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling anything the file leaves out.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let yaml: YamlConfig = serde_yaml::from_str(&text)?;

        let mut config = Self::load_env()?;
        if let Some(service) = yaml.service {
            if let Some(api_key) = service.api_key {
                config.api_key = api_key;
            }
            if let Some(model) = service.model {
                config.model = model;
            }
            if service.azure_endpoint.is_some() {
                config.azure_endpoint = service.azure_endpoint;
            }
            if service.azure_deployment.is_some() {
                config.azure_deployment = service.azure_deployment;
            }
            if let Some(version) = service.azure_api_version {
                config.azure_api_version = version;
            }
        }
        if let Some(session) = yaml.session {
            if session.instructions.is_some() {
                config.instructions = session.instructions;
            }
            if session.temperature.is_some() {
                config.temperature = session.temperature;
            }
            if let Some(voice) = session.voice {
                config.voice = Some(Voice::from_str_or_default(&voice));
            }
        }
        if let Some(audio) = yaml.audio {
            if audio.input_device.is_some() {
                config.input_device = audio.input_device;
            }
            if audio.output_device.is_some() {
                config.output_device = audio.output_device;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn load_env() -> Result<Self, ConfigError> {
        let temperature = match optional_env("VOICELINK_TEMPERATURE") {
            Some(raw) => Some(raw.parse::<f32>().map_err(|_| ConfigError::InvalidValue {
                name: "VOICELINK_TEMPERATURE",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self {
            api_key: optional_env("VOICELINK_API_KEY")
                .or_else(|| optional_env("OPENAI_API_KEY"))
                .unwrap_or_default(),
            model: optional_env("VOICELINK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            azure_endpoint: optional_env("VOICELINK_AZURE_ENDPOINT"),
            azure_deployment: optional_env("VOICELINK_AZURE_DEPLOYMENT"),
            azure_api_version: optional_env("VOICELINK_AZURE_API_VERSION")
                .unwrap_or_else(|| AZURE_API_VERSION.to_string()),
            instructions: optional_env("VOICELINK_INSTRUCTIONS"),
            temperature,
            voice: optional_env("VOICELINK_VOICE").map(|raw| Voice::from_str_or_default(&raw)),
            input_device: optional_env("VOICELINK_INPUT_DEVICE"),
            output_device: optional_env("VOICELINK_OUTPUT_DEVICE"),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.azure_endpoint.is_some() && self.azure_deployment.is_none() {
            return Err(ConfigError::MissingAzureDeployment);
        }
        Ok(())
    }

    /// The service endpoint this configuration selects.
    pub fn endpoint(&self) -> ServiceEndpoint {
        match (&self.azure_endpoint, &self.azure_deployment) {
            (Some(endpoint), Some(deployment)) => ServiceEndpoint::Azure {
                endpoint: endpoint.clone(),
                deployment: deployment.clone(),
                api_version: self.azure_api_version.clone(),
            },
            _ => ServiceEndpoint::OpenAi {
                model: self.model.clone(),
            },
        }
    }

    /// Session settings carried into the configuration frame.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            instructions: self.instructions.clone(),
            temperature: self.temperature,
            voice: self.voice,
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// =============================================================================
// YAML structures
// =============================================================================

/// YAML configuration file structure. All fields optional so partial files
/// overlay the environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct YamlConfig {
    service: Option<ServiceYaml>,
    session: Option<SessionYaml>,
    audio: Option<AudioYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ServiceYaml {
    api_key: Option<String>,
    model: Option<String>,
    azure_endpoint: Option<String>,
    azure_deployment: Option<String>,
    azure_api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct SessionYaml {
    instructions: Option<String>,
    temperature: Option<f32>,
    voice: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct AudioYaml {
    input_device: Option<String>,
    output_device: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
