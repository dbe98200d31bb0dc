use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;

use super::client::InferenceClient;
use super::parser::{parse_verdict, ParseAttempt};
use super::types::{AnalysisResult, ScanUpload, VerdictSource};
use super::validator::validate_upload;
use crate::error::AnalysisError;
use crate::risk::{self, Audience, RiskTier};

/// Anything that can turn a validated scan into model text.
pub trait InferenceBackend: Send + Sync {
    fn submit(&self, upload: &ScanUpload) -> impl Future<Output = Result<String, AnalysisError>> + Send;
}

impl InferenceBackend for InferenceClient {
    fn submit(&self, upload: &ScanUpload) -> impl Future<Output = Result<String, AnalysisError>> + Send {
        InferenceClient::submit(self, upload)
    }
}

impl AnalysisResult {
    /// Presentation tier for clinicians; the parsed level is authoritative.
    pub fn tier(&self) -> RiskTier {
        risk::classify(self.risk_level, Audience::Clinician)
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Validate, submit, parse, classify. One request at a time per analyzer.
pub struct ScanAnalyzer<B = InferenceClient> {
    backend: B,
    in_flight: AtomicBool,
    last_result: Mutex<Option<AnalysisResult>>,
}

impl<B: InferenceBackend> ScanAnalyzer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: AtomicBool::new(false),
            last_result: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Result of the last successful analysis. Failed attempts leave it untouched.
    pub fn last_result(&self) -> Option<AnalysisResult> {
        self.last_result.lock().clone()
    }

    pub async fn analyze(&self, upload: &ScanUpload) -> Result<AnalysisResult, AnalysisError> {
        validate_upload(upload)?;

        let _guard = InFlight::acquire(&self.in_flight).ok_or_else(|| {
            warn!("Rejected analysis of '{}': another request is pending", upload.file_name);
            AnalysisError::AnalysisInFlight
        })?;

        let text = self.backend.submit(upload).await?;

        let attempt = parse_verdict(&text);
        let source = if attempt.is_fallback() {
            VerdictSource::Fallback
        } else {
            VerdictSource::Model
        };
        if let ParseAttempt::Parsed { strategy, .. } = &attempt {
            info!("Verdict extracted via {:?}", strategy);
        }
        let verdict = attempt.into_verdict();

        let result = AnalysisResult {
            scan_type: upload.scan_type,
            file_name: upload.file_name.clone(),
            risk_level: verdict.risk_level,
            confidence: verdict.confidence,
            findings: verdict.findings,
            recommendations: verdict.recommendations,
            image_ref: upload.image_ref(),
            source,
            analyzed_at: Utc::now(),
        };

        info!(
            "✅ {} analysis complete: {} risk ({:.0}% confidence, {:?})",
            result.scan_type, result.risk_level, result.confidence, result.source
        );
        *self.last_result.lock() = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{fallback_verdict, ScanType};
    use crate::risk::RiskLevel;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    const LOW_VERDICT: &str = r#"{"riskLevel":"low","confidence":93,"findings":["No atrophy"],"recommendations":["Routine follow-up"]}"#;
    const MODERATE_VERDICT: &str = r#"{"riskLevel":"moderate","confidence":88,"findings":["Mild periventricular changes"],"recommendations":["Repeat imaging in 12 months"]}"#;

    /// Replies in order, one per submit.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, AnalysisError>>>,
        delay: Duration,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<&str, AnalysisError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl InferenceBackend for ScriptedBackend {
        fn submit(&self, _upload: &ScanUpload) -> impl Future<Output = Result<String, AnalysisError>> + Send {
            let reply = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(AnalysisError::Transport("no scripted reply left".into())));
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                reply
            }
        }
    }

    fn png_upload() -> ScanUpload {
        ScanUpload::new("axial.png", "image/png", ScanType::Mri, vec![0x89, b'P', b'N', b'G'])
    }

    #[tokio::test]
    async fn model_verdict_flows_into_result() {
        let analyzer = ScanAnalyzer::new(ScriptedBackend::new(vec![Ok(LOW_VERDICT)]));
        let result = analyzer.analyze(&png_upload()).await.unwrap();

        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.confidence, 93.0);
        assert_eq!(result.source, VerdictSource::Model);
        assert_eq!(result.scan_type, ScanType::Mri);
        assert!(!result.tier().needs_follow_up);
        assert_eq!(analyzer.last_result(), Some(result));
    }

    #[tokio::test]
    async fn prose_reply_uses_fallback() {
        let analyzer = ScanAnalyzer::new(ScriptedBackend::new(vec![Ok("I cannot determine this.")]));
        let result = analyzer.analyze(&png_upload()).await.unwrap();
        let fallback = fallback_verdict();

        assert_eq!(result.source, VerdictSource::Fallback);
        assert_eq!(result.risk_level, fallback.risk_level);
        assert_eq!(result.findings, fallback.findings);
        assert_eq!(result.recommendations, fallback.recommendations);
    }

    #[tokio::test]
    async fn incomplete_verdict_uses_fallback() {
        let analyzer = ScanAnalyzer::new(ScriptedBackend::new(vec![Ok(r#"{"riskLevel":"high","confidence":97}"#)]));
        let result = analyzer.analyze(&png_upload()).await.unwrap();

        assert_eq!(result.source, VerdictSource::Fallback);
        assert_eq!(result.risk_level, RiskLevel::Moderate);
        assert_eq!(result.findings, fallback_verdict().findings);
    }

    #[tokio::test]
    async fn invalid_upload_never_reaches_backend() {
        let analyzer = ScanAnalyzer::new(ScriptedBackend::new(vec![Ok(LOW_VERDICT)]));
        let pdf = ScanUpload::new("report.pdf", "application/pdf", ScanType::Ct, b"%PDF".to_vec());
        assert!(matches!(analyzer.analyze(&pdf).await, Err(AnalysisError::Validation(_))));
        assert!(!analyzer.is_busy());

        // The scripted reply is still there for the next valid upload
        assert!(analyzer.analyze(&png_upload()).await.is_ok());
    }

    #[tokio::test]
    async fn failure_keeps_previous_result() {
        let analyzer = ScanAnalyzer::new(ScriptedBackend::new(vec![
            Ok(MODERATE_VERDICT),
            Err(AnalysisError::RateLimited),
        ]));

        let first = analyzer.analyze(&png_upload()).await.unwrap();
        assert_eq!(first.risk_level, RiskLevel::Moderate);

        assert!(matches!(analyzer.analyze(&png_upload()).await, Err(AnalysisError::RateLimited)));
        assert_eq!(analyzer.last_result(), Some(first));
        assert!(!analyzer.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_analysis_is_rejected() {
        let analyzer = Arc::new(ScanAnalyzer::new(
            ScriptedBackend::new(vec![Ok(MODERATE_VERDICT), Ok(LOW_VERDICT)])
                .with_delay(Duration::from_secs(2)),
        ));

        let pending = {
            let analyzer = analyzer.clone();
            tokio::spawn(async move { analyzer.analyze(&png_upload()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(analyzer.is_busy());

        assert!(matches!(
            analyzer.analyze(&png_upload()).await,
            Err(AnalysisError::AnalysisInFlight)
        ));

        let first = pending.await.unwrap().unwrap();
        assert_eq!(first.risk_level, RiskLevel::Moderate);
        assert_eq!(first.source, VerdictSource::Model);
        assert!(!analyzer.is_busy());

        // The rejected call consumed nothing; the next one gets the second reply
        let second = analyzer.analyze(&png_upload()).await.unwrap();
        assert_eq!(second.risk_level, RiskLevel::Low);
    }
}
