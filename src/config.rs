use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::assessment::QuestionCategory;

const ENV_PREFIX: &str = "NEUROCHECK";
const DEFAULT_CONFIG_FILE: &str = "neurocheck";

/// Wire protocol spoken to the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InferenceProtocol {
    /// POST `{imageData, scanType}` to an analysis function that talks to the model.
    Function,
    /// Call an OpenAI-compatible chat completions gateway directly.
    ChatCompletions,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InferenceConfig {
    #[validate(url)]
    pub endpoint: String,
    pub api_key: Option<String>,
    pub protocol: InferenceProtocol,
    pub model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:54321/functions/v1/analyze-brain-scan".to_string(),
            api_key: None,
            protocol: InferenceProtocol::Function,
            model: "google/gemini-2.5-flash".to_string(),
            temperature: 0.3,
            request_timeout_secs: 60,
            connect_timeout_secs: 5,
        }
    }
}

impl InferenceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Relative weight of each category in the aggregate risk score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CategoryWeights {
    #[validate(range(min = 0.0))]
    pub memory: f64,
    #[validate(range(min = 0.0))]
    pub problem_solving: f64,
    #[validate(range(min = 0.0))]
    pub speech: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            memory: 1.0,
            problem_solving: 1.0,
            speech: 1.0,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: QuestionCategory) -> f64 {
        match category {
            QuestionCategory::Memory => self.memory,
            QuestionCategory::ProblemSolving => self.problem_solving,
            QuestionCategory::Speech => self.speech,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AssessmentConfig {
    #[validate(range(min = 1))]
    pub stimulus_duration_ms: u64,
    pub auto_advance_delay_ms: u64,
    pub auto_advance_recall: bool,
    #[validate]
    pub weights: CategoryWeights,
    pub question_bank: Option<PathBuf>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            stimulus_duration_ms: 5000,
            auto_advance_delay_ms: 500,
            auto_advance_recall: true,
            weights: CategoryWeights::default(),
            question_bank: None,
        }
    }
}

impl AssessmentConfig {
    pub fn stimulus_duration(&self) -> Duration {
        Duration::from_millis(self.stimulus_duration_ms)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SpeechConfig {
    #[validate(length(min = 2))]
    pub locale: String,
    pub interim_results: bool,
    pub continuous: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            interim_results: true,
            continuous: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate]
    pub inference: InferenceConfig,
    #[validate]
    pub assessment: AssessmentConfig,
    #[validate]
    pub speech: SpeechConfig,
}

impl AppConfig {
    /// Layered load: defaults, then the config file, then `NEUROCHECK_*` environment
    /// variables (`__` separates nested keys, e.g. `NEUROCHECK_INFERENCE__API_KEY`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Don't fail if .env doesn't exist
        dotenvy::dotenv().ok();

        let file_source = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.check()?;
        info!(
            "⚙️ Configuration loaded (protocol: {:?}, endpoint: {})",
            config.inference.protocol, config.inference.endpoint
        );
        if config.inference.api_key.is_none() {
            warn!("Inference API key not configured - requests will be sent without authorization");
        }
        Ok(config)
    }

    /// Field-level validation plus the cross-field rules the derive can't express.
    pub fn check(&self) -> Result<()> {
        self.validate().context("Invalid configuration")?;

        let weights = &self.assessment.weights;
        if weights.memory + weights.problem_solving + weights.speech <= 0.0 {
            anyhow::bail!("Invalid configuration: at least one category weight must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_match_assessment_timing() {
        let config = AppConfig::default();
        assert_eq!(config.assessment.stimulus_duration(), Duration::from_millis(5000));
        assert_eq!(config.assessment.auto_advance_delay(), Duration::from_millis(500));
        assert_eq!(config.speech.locale, "en-US");
        assert!(config.speech.interim_results);
        assert!(!config.speech.continuous);
        assert!(config.check().is_ok());
    }

    #[test]
    fn zero_weights_are_rejected() {
        let mut config = AppConfig::default();
        config.assessment.weights = CategoryWeights {
            memory: 0.0,
            problem_solving: 0.0,
            speech: 0.0,
        };
        assert!(config.check().is_err());
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.inference.endpoint = "not a url".to_string();
        assert!(config.check().is_err());
    }

    #[test]
    #[serial]
    fn file_values_are_overridden_by_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[inference]\nendpoint = \"https://gateway.example.com/v1/chat/completions\"\nprotocol = \"chat-completions\"\n\n[assessment]\nstimulus_duration_ms = 3000"
        )
        .unwrap();

        std::env::set_var("NEUROCHECK_ASSESSMENT__AUTO_ADVANCE_DELAY_MS", "750");
        let config = AppConfig::load(Some(file.path()));
        std::env::remove_var("NEUROCHECK_ASSESSMENT__AUTO_ADVANCE_DELAY_MS");

        let config = config.unwrap();
        assert_eq!(config.inference.protocol, InferenceProtocol::ChatCompletions);
        assert_eq!(config.assessment.stimulus_duration_ms, 3000);
        assert_eq!(config.assessment.auto_advance_delay_ms, 750);
        assert_eq!(config.speech.locale, "en-US");
    }
}
