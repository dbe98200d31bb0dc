pub mod analysis;
pub mod assessment;
pub mod config;
pub mod error;
pub mod risk;
pub mod session;
pub mod speech;

use log::{info, warn};

pub use analysis::{AnalysisResult, InferenceClient, ScanAnalyzer, ScanType, ScanUpload};
pub use assessment::{default_questions, AssessmentReport, FlowEvent, Question, QuestionFlowController};
pub use config::AppConfig;
pub use error::{AnalysisError, AssessmentError, CaptureError, NavigationError};
pub use risk::{RiskLevel, RiskTier};
pub use session::SessionContext;

/// Console logging at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Short, non-secret preview of a credential for logs.
pub fn key_preview(key: &str) -> String {
    if key.len() > 8 && key.is_char_boundary(4) && key.is_char_boundary(key.len() - 4) {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        "***".to_string()
    }
}

pub fn log_configuration_status(config: &AppConfig) {
    info!("🔧 Configuration status:");

    match url::Url::parse(&config.inference.endpoint) {
        Ok(endpoint) => info!(
            "✅ Inference endpoint: {}://{}{} ({:?})",
            endpoint.scheme(),
            endpoint.host_str().unwrap_or("?"),
            endpoint.path(),
            config.inference.protocol
        ),
        Err(e) => warn!("❌ Inference endpoint unparseable: {}", e),
    }

    match config.inference.api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            info!("✅ Inference API key: {} (length: {})", key_preview(key), key.len())
        }
        _ => warn!("❌ Inference API key: not configured"),
    }

    info!(
        "⏱️ Stimulus {}ms, auto-advance {}ms (recall auto-advance: {})",
        config.assessment.stimulus_duration_ms,
        config.assessment.auto_advance_delay_ms,
        config.assessment.auto_advance_recall
    );
    info!("🎤 Speech locale: {}", config.speech.locale);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_preview_hides_the_middle() {
        assert_eq!(key_preview("sk-1234567890abcd"), "sk-1...abcd");
        assert_eq!(key_preview("short"), "***");
    }
}
