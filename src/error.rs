use thiserror::Error;

/// Errors raised while driving an assessment session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssessmentError {
    #[error("Session is not active")]
    SessionInactive,
    #[error("Invalid question bank: {0}")]
    InvalidQuestionBank(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Reasons a navigation request is refused. None of these change session state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("An answer is required before moving on")]
    AnswerRequired,
    #[error("Stimulus is still being presented")]
    StimulusActive,
    #[error("Already at the first question")]
    AtFirstQuestion,
    #[error("Already at the last question")]
    AtLastQuestion,
    #[error("Finish is only available on the last question")]
    NotAtLastQuestion,
    #[error("Question {0} has not been reached yet")]
    NotYetReached(usize),
    #[error("Question index {0} is out of range")]
    OutOfRange(usize),
    #[error("Session has already ended")]
    SessionClosed,
}

/// Speech capture failures. `Unsupported` disables speech for the whole session,
/// `Recognition` is recoverable and the user may retry immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Speech recognition is not supported on this platform")]
    Unsupported,
    #[error("Speech recognition failed: {0}")]
    Recognition(String),
    #[error("The current question does not accept speech input")]
    NotSpeechQuestion,
}

/// Failures of one scan analysis attempt. Prior session state is never touched.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid upload: {0}")]
    Validation(String),
    #[error("Rate limit exceeded. Please try again shortly.")]
    RateLimited,
    #[error("Analysis service credits depleted. Please add credits to continue.")]
    QuotaExceeded,
    #[error("Analysis failed: {0}")]
    Transport(String),
    #[error("An analysis is already in progress for this upload")]
    AnalysisInFlight,
}

impl AnalysisError {
    /// Whether the user can simply retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::RateLimited | AnalysisError::Transport(_))
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Transport(err.to_string())
    }
}

/// Internal to the response parser; always resolved by the fallback verdict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no structured candidate found")]
    NoCandidate,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("verdict out of contract: {0}")]
    OutOfContract(String),
}

pub type Result<T> = std::result::Result<T, AssessmentError>;
