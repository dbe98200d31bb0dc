use std::collections::HashSet;
use std::path::Path;

use log::info;
use serde::{Serialize, Deserialize};
use validator::Validate;

use crate::error::{AssessmentError, Result};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionCategory {
    Memory,
    ProblemSolving,
    Speech,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 3] = [
        QuestionCategory::Memory,
        QuestionCategory::ProblemSolving,
        QuestionCategory::Speech,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QuestionCategory::Memory => "Memory",
            QuestionCategory::ProblemSolving => "Problem Solving",
            QuestionCategory::Speech => "Speech Patterns",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    Recall,
    Pattern,
    SpeechCapture,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: u32,
    pub category: QuestionCategory,
    pub kind: QuestionKind,
    #[validate(length(min = 1))]
    pub prompt: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub stimulus_sequence: Option<Vec<String>>,
    #[serde(default)]
    pub expected_terms: Option<Vec<String>>,
    #[serde(default)]
    pub expected_answer: Option<String>,
}

impl Question {
    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }

    pub fn stimulus(&self) -> &[String] {
        self.stimulus_sequence.as_deref().unwrap_or(&[])
    }

    pub fn expected_terms(&self) -> &[String] {
        self.expected_terms.as_deref().unwrap_or(&[])
    }

    pub fn has_options(&self) -> bool {
        !self.options().is_empty()
    }

    pub fn is_recall(&self) -> bool {
        self.kind == QuestionKind::Recall
    }

    fn check_shape(&self) -> std::result::Result<(), String> {
        self.validate()
            .map_err(|e| format!("question {}: {}", self.id, e))?;

        match self.kind {
            QuestionKind::MultipleChoice | QuestionKind::Pattern if !self.has_options() => {
                return Err(format!("question {} needs at least one option", self.id));
            }
            QuestionKind::Recall if self.stimulus().is_empty() => {
                return Err(format!("question {} needs a stimulus sequence", self.id));
            }
            _ => {}
        }

        if let Some(expected) = &self.expected_answer {
            if self.has_options() && !self.options().iter().any(|o| o == expected) {
                return Err(format!(
                    "question {}: expected answer '{}' is not one of its options",
                    self.id, expected
                ));
            }
        }
        Ok(())
    }
}

/// Checks a whole question list before a session may start on it.
pub fn validate_question_bank(questions: &[Question]) -> Result<()> {
    if questions.is_empty() {
        return Err(AssessmentError::InvalidQuestionBank("question list is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id) {
            return Err(AssessmentError::InvalidQuestionBank(format!(
                "duplicate question id {}",
                question.id
            )));
        }
        question.check_shape().map_err(AssessmentError::InvalidQuestionBank)?;
    }
    Ok(())
}

/// Loads a JSON array of questions and validates it.
pub fn load_question_bank(path: &Path) -> anyhow::Result<Vec<Question>> {
    let raw = std::fs::read_to_string(path)?;
    let questions: Vec<Question> = serde_json::from_str(&raw)?;
    validate_question_bank(&questions)?;
    info!("📋 Loaded {} questions from {}", questions.len(), path.display());
    Ok(questions)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in screening set.
pub fn default_questions() -> Vec<Question> {
    vec![
        Question {
            id: 1,
            category: QuestionCategory::Memory,
            kind: QuestionKind::Recall,
            prompt: "Memorize the following sequence of items. You'll be asked to recall them.".to_string(),
            options: None,
            stimulus_sequence: Some(strings(&["Apple", "Chair", "Blue", "Seven", "Garden"])),
            expected_terms: None,
            expected_answer: None,
        },
        Question {
            id: 2,
            category: QuestionCategory::Memory,
            kind: QuestionKind::MultipleChoice,
            prompt: "Which items were in the previous sequence?".to_string(),
            options: Some(strings(&[
                "Apple, Chair, Blue",
                "Orange, Table, Red",
                "Apple, Door, Green",
                "Banana, Sofa, Yellow",
            ])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("Apple, Chair, Blue".to_string()),
        },
        Question {
            id: 3,
            category: QuestionCategory::ProblemSolving,
            kind: QuestionKind::Pattern,
            prompt: "What comes next in this sequence: 2, 4, 8, 16, ?".to_string(),
            options: Some(strings(&["20", "24", "32", "64"])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("32".to_string()),
        },
        Question {
            id: 4,
            category: QuestionCategory::ProblemSolving,
            kind: QuestionKind::MultipleChoice,
            prompt: "If all roses are flowers and some flowers fade quickly, which statement must be true?".to_string(),
            options: Some(strings(&[
                "All roses fade quickly",
                "Some roses might fade quickly",
                "No roses fade quickly",
                "Only roses fade quickly",
            ])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("Some roses might fade quickly".to_string()),
        },
        Question {
            id: 5,
            category: QuestionCategory::ProblemSolving,
            kind: QuestionKind::Pattern,
            prompt: "Which number doesn't belong: 3, 5, 7, 9, 12, 15".to_string(),
            options: Some(strings(&["3", "9", "12", "15"])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("12".to_string()),
        },
        Question {
            id: 6,
            category: QuestionCategory::Memory,
            kind: QuestionKind::MultipleChoice,
            prompt: "What was the FIRST item in the sequence you memorized earlier?".to_string(),
            options: Some(strings(&["Apple", "Chair", "Blue", "Seven"])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("Apple".to_string()),
        },
        Question {
            id: 7,
            category: QuestionCategory::ProblemSolving,
            kind: QuestionKind::MultipleChoice,
            prompt: "A clock shows 3:15. What is the angle between the hour and minute hands?".to_string(),
            options: Some(strings(&["0 degrees", "7.5 degrees", "15 degrees", "30 degrees"])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("7.5 degrees".to_string()),
        },
        Question {
            id: 8,
            category: QuestionCategory::Speech,
            kind: QuestionKind::MultipleChoice,
            prompt: "Choose the word that best completes: 'Hot is to Cold as Day is to ___'".to_string(),
            options: Some(strings(&["Night", "Sun", "Morning", "Bright"])),
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: Some("Night".to_string()),
        },
        Question {
            id: 9,
            category: QuestionCategory::Speech,
            kind: QuestionKind::SpeechCapture,
            prompt: "Say out loud the five items from the sequence you memorized at the start.".to_string(),
            options: None,
            stimulus_sequence: None,
            expected_terms: Some(strings(&["apple", "chair", "blue", "seven", "garden"])),
            expected_answer: None,
        },
        Question {
            id: 10,
            category: QuestionCategory::Speech,
            kind: QuestionKind::SpeechCapture,
            prompt: "Describe, in a few sentences, what you did yesterday morning.".to_string(),
            options: None,
            stimulus_sequence: None,
            expected_terms: None,
            expected_answer: None,
        },
    ]
}
