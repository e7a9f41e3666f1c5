use serde::{Deserialize, Serialize};

use super::error::EngineError;
use crate::models::{Answer, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Updated,
    Unchanged,
    /// The store is sealed; nothing was written.
    Ignored,
}

/// Answer slots, one per question in question order. Sized once at session
/// start and sealed on the terminal transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerStore {
    slots: Vec<Answer>,
    #[serde(skip)]
    sealed: bool,
}

impl AnswerStore {
    pub fn for_questions(questions: &[Question]) -> Self {
        Self {
            slots: questions.iter().map(|q| Answer::empty(&q.id)).collect(),
            sealed: false,
        }
    }

    pub fn record(&mut self, index: usize, value: &str) -> Result<RecordOutcome, EngineError> {
        if self.sealed {
            return Ok(RecordOutcome::Ignored);
        }

        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(EngineError::QuestionIndexOutOfRange { index, len })?;

        if slot.value == value {
            return Ok(RecordOutcome::Unchanged);
        }
        slot.value = value.to_string();
        Ok(RecordOutcome::Updated)
    }

    /// Adds advisory time to one slot; out-of-range indexes are ignored.
    pub fn accrue_time(&mut self, index: usize, seconds: u32) {
        if self.sealed {
            return;
        }
        if let Some(slot) = self.slots.get_mut(index) {
            slot.time_spent = slot.time_spent.saturating_add(seconds);
        }
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Answer> {
        self.slots.get(index)
    }

    pub fn as_slice(&self) -> &[Answer] {
        &self.slots
    }

    pub fn answered_flags(&self) -> Vec<bool> {
        self.slots.iter().map(Answer::is_answered).collect()
    }

    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|a| a.is_answered()).count()
    }
}
