use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    ops::RangeInclusive,
    path::PathBuf,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::{
    assets::{get_config_dir, get_default_config},
    model::ModelConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Credential error: {0}")]
    Credential(String),
}

/// UI-exposed bound for the sampling temperature.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// UI-exposed bound for the generated-length limit.
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 50..=300;

/// Generation parameters submitted with every request.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GenerationProfile {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationProfile {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 150,
        }
    }
}

impl GenerationProfile {
    /// Values dispatched to a provider always sit inside the UI bounds.
    pub fn clamped(&self) -> Self {
        Self {
            temperature: self
                .temperature
                .clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end()),
            max_tokens: self
                .max_tokens
                .clamp(*MAX_TOKENS_RANGE.start(), *MAX_TOKENS_RANGE.end()),
        }
    }
}

/// Per-flow configuration: the ordered model table exposed to the user
/// and the generation profile applied by default.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModeConfig {
    pub models: Vec<ModelConfig>,
    pub profile: GenerationProfile,
}

impl ModeConfig {
    /// First table entry is the default.
    pub fn default_model(&self) -> &ModelConfig {
        &self.models[0]
    }

    pub fn find_model(&self, key: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|model| model.matches(key))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub models: Vec<ModelConfig>,
    pub profiles: HashMap<String, GenerationProfile>,
    pub ask: ModeConfig,
    pub chat: ModeConfig,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StringOrObject<T> {
    String(String),
    Object(T),
}

#[derive(Deserialize, Debug)]
struct RawConfig {
    models: Vec<ModelConfig>,
    #[serde(default)]
    profiles: HashMap<String, GenerationProfile>,
    ask: RawModeConfig,
    chat: RawModeConfig,
}

#[derive(Deserialize, Debug)]
struct RawModeConfig {
    models: Vec<String>,
    #[serde(default)]
    profile: Option<StringOrObject<GenerationProfile>>,
}

impl RawConfig {
    #[instrument(skip(self))]
    fn to_config(&self) -> Result<Config, ConfigError> {
        let resolve_mode = |name: &str, mode: &RawModeConfig| -> Result<ModeConfig, ConfigError> {
            if mode.models.is_empty() {
                return Err(ConfigError::Config(format!(
                    "Mode '{name}' lists no models"
                )));
            }

            let mut models = Vec::with_capacity(mode.models.len());
            for key in &mode.models {
                let model = self
                    .models
                    .iter()
                    .find(|m| m.matches(key))
                    .cloned()
                    .ok_or_else(|| ConfigError::Config(format!("Model '{key}' not found")))?;
                models.push(model);
            }

            let profile = match &mode.profile {
                Some(StringOrObject::String(s)) => self
                    .profiles
                    .get(s)
                    .cloned()
                    .ok_or_else(|| ConfigError::Config(format!("Profile '{s}' not found")))?,
                Some(StringOrObject::Object(p)) => p.clone(),
                None => GenerationProfile::default(),
            };

            Ok(ModeConfig {
                models,
                // Config-supplied values clamp into the UI bounds too.
                profile: profile.clamped(),
            })
        };

        Ok(Config {
            models: self.models.clone(),
            profiles: self.profiles.clone(),
            ask: resolve_mode("ask", &self.ask)?,
            chat: resolve_mode("chat", &self.chat)?,
        })
    }
}

#[instrument(skip(config_path))]
pub fn create_or_get_config_file(
    config_path: Option<PathBuf>,
) -> Result<(bool, PathBuf), ConfigError> {
    let actual_path = config_path.unwrap_or_else(|| {
        let config_dir = get_config_dir();
        config_dir.join("confab.yml")
    });

    let parent_dir = actual_path.parent().ok_or_else(|| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Config path has no parent directory",
        ))
    })?;

    if !parent_dir.exists() {
        fs::create_dir_all(parent_dir)?;
    }

    if actual_path.exists() {
        Ok((true, actual_path))
    } else {
        File::create(&actual_path)?.write_all(get_default_config().as_bytes())?;
        Ok((false, actual_path))
    }
}

#[instrument(skip(config_path))]
pub fn get_config(config_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let (_, config_file) = create_or_get_config_file(config_path)?;
    let content = fs::read_to_string(&config_file)?;
    let raw: RawConfig = serde_yaml::from_str(&content)?;
    raw.to_config()
}
