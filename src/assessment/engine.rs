use std::collections::HashSet;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Serialize, Deserialize};
use tokio::sync::mpsc;

use super::scoring::{score_assessment, tier_for, AssessmentReport};
use super::timer::{StimulusTimer, TimerEvent, TimerKind};
use super::{validate_question_bank, AnswerStore, Question, QuestionKind};
use crate::config::AssessmentConfig;
use crate::error::{AssessmentError, CaptureError, NavigationError, Result};
use crate::session::SessionContext;
use crate::speech::{CaptureState, SpeechCaptureAdapter, SpeechUpdate};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StimulusPhase {
    Presenting,
    Capturing,
    Answered,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionState {
    pub current_index: usize,
    pub answers: AnswerStore,
    pub phase: StimulusPhase,
}

/// Things that happen to a session without the user calling a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    StimulusHidden { index: usize },
    AutoAdvanced { from: usize, to: usize },
    InterimTranscript { index: usize, text: String },
    TranscriptCommitted { index: usize, text: String },
    CaptureFailed { index: usize, error: CaptureError },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Progress {
    /// 1-based
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub percent: f64,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorStatus {
    Current,
    Answered,
    Pending,
}

enum Incoming {
    Timer(TimerEvent),
    Speech(SpeechUpdate),
}

/// Drives one assessment session: which question is shown, what input it accepts and
/// whether navigation is allowed.
///
/// Timer expiry and speech results arrive through [`next_event`](Self::next_event) and are
/// applied as transitions of the same state machine as the navigation calls, so the two
/// never race. Must be created inside a tokio runtime.
pub struct QuestionFlowController {
    session: SessionContext,
    questions: Vec<Question>,
    config: AssessmentConfig,
    state: SessionState,
    furthest_visited: usize,
    presented: HashSet<u32>,
    timer: StimulusTimer,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    speech: SpeechCaptureAdapter,
    closed: bool,
}

impl QuestionFlowController {
    pub fn new(
        session: SessionContext,
        questions: Vec<Question>,
        config: AssessmentConfig,
        speech: SpeechCaptureAdapter,
    ) -> Result<Self> {
        if !session.is_active {
            return Err(AssessmentError::SessionInactive);
        }
        validate_question_bank(&questions)?;

        let (timer, timer_events) = StimulusTimer::new();
        let mut controller = Self {
            session,
            questions,
            config,
            state: SessionState {
                current_index: 0,
                answers: AnswerStore::new(),
                phase: StimulusPhase::Capturing,
            },
            furthest_visited: 0,
            presented: HashSet::new(),
            timer,
            timer_events,
            speech,
            closed: false,
        };

        info!(
            "🎬 Assessment session {} started for user {} ({} questions)",
            controller.session.session_id,
            controller.session.user_id,
            controller.questions.len()
        );
        controller.enter(0);
        Ok(controller)
    }

    fn enter(&mut self, index: usize) {
        self.timer.cancel_all();
        self.speech.stop();

        self.state.current_index = index;
        self.furthest_visited = self.furthest_visited.max(index);

        let question = &self.questions[index];
        self.state.phase = if question.is_recall() && !self.presented.contains(&question.id) {
            self.timer
                .present(question.stimulus().to_vec(), self.config.stimulus_duration());
            StimulusPhase::Presenting
        } else if self.state.answers.contains(question.id) {
            StimulusPhase::Answered
        } else {
            StimulusPhase::Capturing
        };

        debug!(
            "Question {}/{} (id {}) entered in {:?}",
            index + 1,
            self.questions.len(),
            question.id,
            self.state.phase
        );
    }

    fn ensure_open(&self) -> std::result::Result<(), NavigationError> {
        if self.closed {
            Err(NavigationError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn is_last(&self) -> bool {
        self.state.current_index + 1 == self.questions.len()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.state.current_index]
    }

    pub fn phase(&self) -> StimulusPhase {
        self.state.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.state.answers
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_last_question(&self) -> bool {
        self.is_last()
    }

    /// Items on screen while a recall stimulus is presenting.
    pub fn visible_stimulus(&self) -> Option<&[String]> {
        self.timer.visible_items()
    }

    pub fn speech_state(&self) -> CaptureState {
        self.speech.state()
    }

    pub fn speech_supported(&self) -> bool {
        self.speech.is_supported()
    }

    pub fn interim_transcript(&self) -> &str {
        self.speech.interim_transcript()
    }

    /// The unsupported-speech notice, handed out once per session.
    pub fn speech_notice(&mut self) -> Option<CaptureError> {
        self.speech.take_capability_notice()
    }

    /// Whether "Next" (or "Finish" on the last question) is enabled.
    pub fn can_advance(&self) -> bool {
        if self.closed {
            return false;
        }
        match self.state.phase {
            StimulusPhase::Presenting => false,
            _ => {
                let question = self.current_question();
                question.is_recall() || self.state.answers.contains(question.id)
            }
        }
    }

    fn advance_check(&self) -> std::result::Result<(), NavigationError> {
        self.ensure_open()?;
        if self.state.phase == StimulusPhase::Presenting {
            return Err(NavigationError::StimulusActive);
        }
        if !self.can_advance() {
            return Err(NavigationError::AnswerRequired);
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<usize> {
        self.advance_check()?;
        if self.is_last() {
            return Err(NavigationError::AtLastQuestion.into());
        }
        let to = self.state.current_index + 1;
        self.enter(to);
        Ok(to)
    }

    pub fn previous(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.state.current_index == 0 {
            return Err(NavigationError::AtFirstQuestion.into());
        }
        let to = self.state.current_index - 1;
        self.enter(to);
        Ok(to)
    }

    /// Jumps to any visited question; a step forward to an unvisited one follows the
    /// same rule as [`next`](Self::next).
    pub fn jump_to(&mut self, index: usize) -> Result<usize> {
        self.ensure_open()?;
        if index >= self.questions.len() {
            return Err(NavigationError::OutOfRange(index).into());
        }
        if index == self.state.current_index {
            return Ok(index);
        }
        if index <= self.furthest_visited {
            self.enter(index);
            return Ok(index);
        }
        if index == self.state.current_index + 1 {
            return self.next();
        }
        Err(NavigationError::NotYetReached(index).into())
    }

    fn accepting_input(&self) -> Result<()> {
        self.ensure_open()?;
        if self.state.phase == StimulusPhase::Presenting {
            return Err(NavigationError::StimulusActive.into());
        }
        Ok(())
    }

    /// Records the chosen option, overwriting any earlier choice.
    pub fn select_option(&mut self, option: &str) -> Result<()> {
        self.accepting_input()?;
        let question = &self.questions[self.state.current_index];
        if !question.has_options() {
            return Err(AssessmentError::InvalidResponse(format!(
                "question {} has no options",
                question.id
            )));
        }
        if !question.options().iter().any(|o| o == option) {
            return Err(AssessmentError::InvalidResponse(format!(
                "'{}' is not an option of question {}",
                option, question.id
            )));
        }

        let id = question.id;
        if let Some(previous) = self.state.answers.record(id, option) {
            if previous != option {
                debug!("Answer for question {} changed from '{}' to '{}'", id, previous, option);
            }
        }
        self.state.phase = StimulusPhase::Answered;
        Ok(())
    }

    /// Free-text response for questions without options. This is also the typed fallback
    /// for speech questions when speech capture is unavailable.
    pub fn submit_response(&mut self, text: &str) -> Result<()> {
        self.accepting_input()?;
        let question = &self.questions[self.state.current_index];
        if question.has_options() {
            return Err(AssessmentError::InvalidResponse(format!(
                "question {} expects one of its options",
                question.id
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(AssessmentError::InvalidResponse("response is empty".to_string()));
        }

        let id = question.id;
        self.speech.stop();
        self.state.answers.record(id, text);
        self.state.phase = StimulusPhase::Answered;
        Ok(())
    }

    pub fn start_speech(&mut self) -> Result<()> {
        self.accepting_input()?;
        if self.current_question().kind != QuestionKind::SpeechCapture {
            return Err(CaptureError::NotSpeechQuestion.into());
        }
        self.speech.start()?;
        Ok(())
    }

    pub fn stop_speech(&mut self) {
        self.speech.stop();
    }

    fn handle_timer(&mut self, event: TimerEvent) -> Option<FlowEvent> {
        if !self.timer.accept(event) {
            return None;
        }

        let index = self.state.current_index;
        match event.kind {
            TimerKind::StimulusHidden => {
                let question = &self.questions[index];
                self.presented.insert(question.id);
                self.state.phase = if self.state.answers.contains(question.id) {
                    StimulusPhase::Answered
                } else {
                    StimulusPhase::Capturing
                };

                if self.config.auto_advance_recall && !question.has_options() && !self.is_last() {
                    self.timer.schedule_advance(self.config.auto_advance_delay());
                }
                info!("🙈 Stimulus for question {} hidden", index + 1);
                Some(FlowEvent::StimulusHidden { index })
            }
            TimerKind::AutoAdvance => {
                if self.is_last() {
                    return None;
                }
                let to = index + 1;
                self.enter(to);
                info!("⏭️ Auto-advanced from question {} to {}", index + 1, to + 1);
                Some(FlowEvent::AutoAdvanced { from: index, to })
            }
        }
    }

    fn handle_speech(&mut self, update: SpeechUpdate) -> Option<FlowEvent> {
        let index = self.state.current_index;
        match update {
            SpeechUpdate::Interim(text) => Some(FlowEvent::InterimTranscript { index, text }),
            SpeechUpdate::Final(text) => {
                let id = self.questions[index].id;
                self.state.answers.record(id, text.clone());
                self.state.phase = StimulusPhase::Answered;
                Some(FlowEvent::TranscriptCommitted { index, text })
            }
            SpeechUpdate::Failed(error) => {
                warn!("Speech capture failed on question {}: {}", index + 1, error);
                Some(FlowEvent::CaptureFailed { index, error })
            }
        }
    }

    /// True while a timer or a speech capture could still produce an event.
    pub fn has_pending_events(&self) -> bool {
        !self.closed
            && (self.timer.is_presenting() || self.timer.is_advance_pending() || self.speech.is_listening())
    }

    /// Waits for the next timer or speech transition and applies it. Returns `None` once
    /// nothing is pending.
    pub async fn next_event(&mut self) -> Option<FlowEvent> {
        loop {
            if !self.has_pending_events() {
                return None;
            }
            let listening = self.speech.is_listening();
            let incoming = tokio::select! {
                Some(event) = self.timer_events.recv() => Incoming::Timer(event),
                Some(update) = self.speech.next_update(), if listening => Incoming::Speech(update),
                else => return None,
            };

            let handled = match incoming {
                Incoming::Timer(event) => self.handle_timer(event),
                Incoming::Speech(update) => self.handle_speech(update),
            };
            if handled.is_some() {
                return handled;
            }
        }
    }

    /// Ends the session on the last question and scores it.
    pub fn finish(&mut self) -> Result<AssessmentReport> {
        self.ensure_open()?;
        if !self.is_last() {
            return Err(NavigationError::NotAtLastQuestion.into());
        }
        self.advance_check()?;

        self.teardown();
        let score = score_assessment(&self.questions, &self.state.answers, &self.config.weights);
        let tier = tier_for(&score);
        info!(
            "✅ Assessment {} finished: risk score {:.1} ({})",
            self.session.session_id, score.risk_score, score.risk_level
        );

        Ok(AssessmentReport {
            session_id: self.session.session_id,
            user_id: self.session.user_id.clone(),
            completed_at: Utc::now(),
            answers: self.state.answers.clone(),
            score,
            tier,
        })
    }

    /// Leaves the session (navigation away). Pending timers and capture are released and
    /// nothing fires afterwards.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.timer.cancel_all();
        self.speech.stop();
        self.closed = true;
        debug!("Assessment session {} torn down", self.session.session_id);
    }

    pub fn progress(&self) -> Progress {
        let total = self.questions.len();
        let answered = self
            .questions
            .iter()
            .filter(|q| self.state.answers.contains(q.id))
            .count();
        Progress {
            position: self.state.current_index + 1,
            total,
            answered,
            percent: (self.state.current_index + 1) as f64 / total as f64 * 100.0,
        }
    }

    pub fn question_indicators(&self) -> Vec<IndicatorStatus> {
        self.questions
            .iter()
            .enumerate()
            .map(|(idx, q)| {
                if idx == self.state.current_index {
                    IndicatorStatus::Current
                } else if self.state.answers.contains(q.id) {
                    IndicatorStatus::Answered
                } else {
                    IndicatorStatus::Pending
                }
            })
            .collect()
    }
}

impl Drop for QuestionFlowController {
    fn drop(&mut self) {
        self.teardown();
    }
}
