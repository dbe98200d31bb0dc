use chrono::{DateTime, Utc};
use log::warn;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use super::{AnswerStore, Question, QuestionCategory, QuestionKind};
use crate::config::CategoryWeights;
use crate::risk::{self, Audience, RiskLevel, RiskTier};
use crate::speech::normalize_transcript;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CategoryScore {
    pub category: QuestionCategory,
    /// 0-100
    pub score: u8,
    /// Sum of per-question credit, partial credit included.
    pub earned: f64,
    pub scored: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AssessmentScore {
    pub categories: Vec<CategoryScore>,
    /// 0-100, unrounded. The level is derived from this value.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

impl AssessmentScore {
    pub fn category(&self, category: QuestionCategory) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Final output of a completed assessment session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssessmentReport {
    pub session_id: Uuid,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    pub answers: AnswerStore,
    pub score: AssessmentScore,
    pub tier: RiskTier,
}

fn comparable(text: &str) -> String {
    normalize_transcript(text).to_lowercase()
}

fn words(text: &str) -> String {
    let joined = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!(" {} ", joined)
}

/// Credit in [0, 1] for one question, or `None` when the question isn't scored
/// (a recall stimulus with nothing to answer).
pub fn question_credit(question: &Question, answer: Option<&str>) -> Option<f64> {
    let answer = answer.map(str::trim).filter(|a| !a.is_empty());

    if let Some(expected) = &question.expected_answer {
        return Some(match answer {
            Some(answer) if comparable(answer) == comparable(expected) => 1.0,
            _ => 0.0,
        });
    }

    match question.kind {
        QuestionKind::Recall if !question.has_options() => None,
        QuestionKind::SpeechCapture if !question.expected_terms().is_empty() => {
            let Some(answer) = answer else {
                return Some(0.0);
            };
            let spoken = words(answer);
            let terms = question.expected_terms();
            let hits = terms
                .iter()
                .filter(|term| {
                    let term = words(term);
                    term.trim().is_empty() || spoken.contains(&term)
                })
                .count();
            Some(hits as f64 / terms.len() as f64)
        }
        // No fixed expectation: completion only
        _ => Some(if answer.is_some() { 1.0 } else { 0.0 }),
    }
}

/// Pure scoring of a session's answers. Identical inputs always give identical output.
pub fn score_assessment(
    questions: &[Question],
    answers: &AnswerStore,
    weights: &CategoryWeights,
) -> AssessmentScore {
    let mut categories = Vec::new();

    for category in QuestionCategory::ALL {
        let credits: Vec<f64> = questions
            .iter()
            .filter(|q| q.category == category)
            .filter_map(|q| question_credit(q, answers.get(q.id)))
            .collect();

        if credits.is_empty() {
            continue;
        }

        let earned: f64 = credits.iter().sum();
        let score = (100.0 * earned / credits.len() as f64).round().clamp(0.0, 100.0) as u8;
        categories.push(CategoryScore {
            category,
            score,
            earned,
            scored: credits.len() as u32,
        });
    }

    let mean = weighted_mean(&categories, weights);
    let risk_score = match mean {
        Some(mean) => (100.0 - mean).clamp(0.0, 100.0),
        None => {
            warn!("No scorable questions in assessment - reporting maximum risk");
            100.0
        }
    };

    AssessmentScore {
        categories,
        risk_score,
        risk_level: RiskLevel::from_risk(risk_score),
    }
}

/// Category percentage before rounding for display.
fn percent(category: &CategoryScore) -> f64 {
    100.0 * category.earned / category.scored as f64
}

fn weighted_mean(categories: &[CategoryScore], weights: &CategoryWeights) -> Option<f64> {
    if categories.is_empty() {
        return None;
    }

    let total_weight: f64 = categories.iter().map(|c| weights.weight(c.category)).sum();
    if total_weight > 0.0 {
        let sum: f64 = categories
            .iter()
            .map(|c| weights.weight(c.category) * percent(c))
            .sum();
        Some(sum / total_weight)
    } else {
        // Every present category is weighted zero; fall back to a plain mean
        let sum: f64 = categories.iter().map(percent).sum();
        Some(sum / categories.len() as f64)
    }
}

pub(crate) fn tier_for(score: &AssessmentScore) -> RiskTier {
    risk::classify(score.risk_level, Audience::SelfAssessment)
}
