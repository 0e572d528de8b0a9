use crate::completion::CompletionModel;
use crate::config::ConfigError;
use crate::model::{ModelConfig, ModelProvider};
use crate::provider::{huggingface, ollama};
use tracing::instrument;

/// Build the provider collaborator for a configured model. Configuration
/// and credential problems surface here, before any generation attempt.
#[instrument(skip(model_config), fields(model = %model_config.name))]
pub fn get_completion_llm(
    model_config: ModelConfig,
) -> Result<Box<dyn CompletionModel + Send + Sync>, ConfigError> {
    match model_config.provider {
        ModelProvider::Ollama => {
            let model = ollama::OllamaModel::new(model_config)?;
            Ok(Box::new(model))
        }
        ModelProvider::Huggingface => {
            let model = huggingface::HuggingFaceModel::new(model_config)?;
            Ok(Box::new(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_get_completion_llm_ollama_provider() {
        let model_config = ModelConfig {
            name: "mistral".to_string(),
            label: None,
            provider: ModelProvider::Ollama,
            settings: HashMap::new(),
        };
        assert!(get_completion_llm(model_config).is_ok());
    }

    #[test]
    fn test_get_completion_llm_huggingface_provider() {
        let settings = HashMap::from([
            ("endpoint".to_string(), "http://localhost:1234".into()),
            ("api_key".to_string(), "hf_dummy".into()),
        ]);
        let model_config = ModelConfig {
            name: "HuggingFaceH4/zephyr-7b-alpha".to_string(),
            label: None,
            provider: ModelProvider::Huggingface,
            settings,
        };
        assert!(get_completion_llm(model_config).is_ok());
    }

    #[test]
    fn test_get_completion_llm_huggingface_requires_api_key() {
        // The settings block carries no api_key at all.
        let model_config = ModelConfig {
            name: "HuggingFaceH4/zephyr-7b-alpha".to_string(),
            label: None,
            provider: ModelProvider::Huggingface,
            settings: HashMap::new(),
        };
        let err = get_completion_llm(model_config).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
