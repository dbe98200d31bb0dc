use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

/// Captured responses for one session, keyed by question id.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AnswerStore {
    answers: BTreeMap<u32, String>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or overwrites) the answer for a question. Returns the previous value.
    pub fn record(&mut self, question_id: u32, text: impl Into<String>) -> Option<String> {
        self.answers.insert(question_id, text.into())
    }

    pub fn get(&self, question_id: u32) -> Option<&str> {
        self.answers.get(&question_id).map(String::as_str)
    }

    pub fn contains(&self, question_id: u32) -> bool {
        self.answers.contains_key(&question_id)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.answers.iter().map(|(id, text)| (*id, text.as_str()))
    }
}

impl FromIterator<(u32, String)> for AnswerStore {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}
