pub mod transcript;

pub use transcript::*;

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::SpeechConfig;
use crate::error::CaptureError;

/// Raw results reported by a platform recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Interim(String),
    Final(String),
    Error(String),
}

/// Platform speech-to-text capability.
///
/// `start` begins one non-continuous recognition and reports through `sink`: any number
/// of interim results, then exactly one final result or an error.
pub trait SpeechRecognizer: Send {
    fn start(
        &mut self,
        config: &SpeechConfig,
        sink: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> std::result::Result<(), String>;

    fn stop(&mut self);
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
}

/// What the adapter surfaces to the flow controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechUpdate {
    Interim(String),
    Final(String),
    Failed(CaptureError),
}

pub struct SpeechCaptureAdapter {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    config: SpeechConfig,
    state: CaptureState,
    events: Option<mpsc::UnboundedReceiver<RecognitionEvent>>,
    transcript: TranscriptBuffer,
    capability_notice_pending: bool,
    invocations: u64,
}

impl SpeechCaptureAdapter {
    /// The capability check happens here, once, rather than at every call site.
    pub fn new(recognizer: Option<Box<dyn SpeechRecognizer>>, config: SpeechConfig) -> Self {
        let supported = recognizer.is_some();
        if supported {
            info!("🎤 Speech capture available (locale: {})", config.locale);
        } else {
            warn!("Speech recognition not available - speech questions fall back to typed input");
        }
        Self {
            recognizer,
            config,
            state: CaptureState::Idle,
            events: None,
            transcript: TranscriptBuffer::new(),
            capability_notice_pending: !supported,
            invocations: 0,
        }
    }

    pub fn unsupported(config: SpeechConfig) -> Self {
        Self::new(None, config)
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Yields the unsupported-capability error at most once per session.
    pub fn take_capability_notice(&mut self) -> Option<CaptureError> {
        if self.capability_notice_pending {
            self.capability_notice_pending = false;
            Some(CaptureError::Unsupported)
        } else {
            None
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    pub fn interim_transcript(&self) -> &str {
        self.transcript.interim()
    }

    pub fn committed_transcript(&self) -> Option<&str> {
        self.transcript.committed()
    }

    pub fn start(&mut self) -> std::result::Result<(), CaptureError> {
        let Some(recognizer) = self.recognizer.as_mut() else {
            self.capability_notice_pending = false;
            return Err(CaptureError::Unsupported);
        };

        if self.state == CaptureState::Listening {
            debug!("Restarting speech capture");
            recognizer.stop();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.transcript.reset();
        if let Err(e) = recognizer.start(&self.config, tx) {
            self.state = CaptureState::Idle;
            self.events = None;
            return Err(CaptureError::Recognition(e));
        }

        self.invocations += 1;
        self.events = Some(rx);
        self.state = CaptureState::Listening;
        info!("🎙️ Listening (invocation #{})", self.invocations);
        Ok(())
    }

    /// Safe to call in any state; does nothing when idle.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Idle {
            return;
        }
        self.finish_listening();
        info!("🛑 Speech capture stopped");
    }

    fn finish_listening(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        // Dropping the receiver discards anything the recognizer still sends
        self.events = None;
        self.state = CaptureState::Idle;
    }

    /// Applies one recognizer event. Events arriving while idle are stale and ignored.
    pub fn apply(&mut self, event: RecognitionEvent) -> Option<SpeechUpdate> {
        if self.state != CaptureState::Listening {
            debug!("Dropping speech event while idle: {:?}", event);
            return None;
        }

        match event {
            RecognitionEvent::Interim(text) => {
                if self.transcript.push_interim(&text) {
                    Some(SpeechUpdate::Interim(self.transcript.interim().to_string()))
                } else {
                    None
                }
            }
            RecognitionEvent::Final(text) => {
                let committed = self.transcript.commit(&text).map(str::to_string);
                self.finish_listening();
                match committed {
                    Some(text) => {
                        info!("📝 Final transcript committed ({} chars)", text.len());
                        Some(SpeechUpdate::Final(text))
                    }
                    None => Some(SpeechUpdate::Failed(CaptureError::Recognition(
                        "no speech detected".to_string(),
                    ))),
                }
            }
            RecognitionEvent::Error(message) => {
                warn!("Speech recognition error: {}", message);
                self.finish_listening();
                Some(SpeechUpdate::Failed(CaptureError::Recognition(message)))
            }
        }
    }

    /// Waits for the next meaningful update of the current invocation. Returns `None`
    /// when not listening.
    pub async fn next_update(&mut self) -> Option<SpeechUpdate> {
        loop {
            let received = self.events.as_mut()?.recv().await;
            match received {
                Some(event) => {
                    if let Some(update) = self.apply(event) {
                        return Some(update);
                    }
                }
                None => {
                    self.finish_listening();
                    return Some(SpeechUpdate::Failed(CaptureError::Recognition(
                        "recognition ended without a result".to_string(),
                    )));
                }
            }
        }
    }
}

impl Drop for SpeechCaptureAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recognizer whose results are pushed in by the host application, e.g. from a
/// streaming transcription service connection.
pub struct FeedRecognizer {
    sink: Arc<Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>>,
}

/// Host-side handle of a [`FeedRecognizer`].
#[derive(Clone)]
pub struct RecognizerFeed {
    sink: Arc<Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>>,
}

pub fn feed_recognizer() -> (FeedRecognizer, RecognizerFeed) {
    let sink = Arc::new(Mutex::new(None));
    (
        FeedRecognizer { sink: sink.clone() },
        RecognizerFeed { sink },
    )
}

impl SpeechRecognizer for FeedRecognizer {
    fn start(
        &mut self,
        config: &SpeechConfig,
        sink: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> std::result::Result<(), String> {
        debug!(
            "Feed recognizer started (locale: {}, interim: {}, continuous: {})",
            config.locale, config.interim_results, config.continuous
        );
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.lock().take();
    }
}

impl RecognizerFeed {
    fn send(&self, event: RecognitionEvent) -> bool {
        let guard = self.sink.lock();
        match guard.as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Returns `false` when no recognition is in progress.
    pub fn interim(&self, text: &str) -> bool {
        self.send(RecognitionEvent::Interim(text.to_string()))
    }

    pub fn finalize(&self, text: &str) -> bool {
        self.send(RecognitionEvent::Final(text.to_string()))
    }

    pub fn fail(&self, message: &str) -> bool {
        self.send(RecognitionEvent::Error(message.to_string()))
    }

    pub fn is_listening(&self) -> bool {
        self.sink.lock().is_some()
    }
}
