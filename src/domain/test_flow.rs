use crate::domain::models::{Answer, Question, TraitScores};
use crate::domain::scoring;
use serde::Serialize;

pub const DEFAULT_ADAPTIVE_THRESHOLD: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum SessionStatus {
    Presenting(usize),
    Submitting,
    Complete,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("session is not accepting answers")]
    NotPresenting,
    #[error("value {0} is not an option for this question")]
    InvalidValue(i16),
    #[error("adaptive questions were already added")]
    AlreadyAdaptive,
    #[error("{missing} question(s) still unanswered")]
    Incomplete { missing: usize },
    #[error("no submission in progress")]
    NotSubmitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Presenting,
    Submitting,
    Complete,
}

/// Where the session landed after an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Next(usize),
    ReadyToSubmit,
}

/// One test run: which question is showing, what has been answered, and
/// whether the adaptive batch has been pulled in.
#[derive(Debug, Clone)]
pub struct TestSession {
    questions: Vec<Question>,
    values: Vec<Option<i16>>,
    index: usize,
    phase: Phase,
    use_ai: bool,
    adaptive: bool,
    adaptive_threshold: usize,
}

impl TestSession {
    pub fn new(questions: Vec<Question>, use_ai: bool, adaptive_threshold: usize) -> Self {
        let values = vec![None; questions.len()];
        Self {
            questions,
            values,
            index: 0,
            phase: Phase::Presenting,
            use_ai,
            adaptive: false,
            adaptive_threshold: adaptive_threshold.max(1),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.phase {
            Phase::Presenting => SessionStatus::Presenting(self.index),
            Phase::Submitting => SessionStatus::Submitting,
            Phase::Complete => SessionStatus::Complete,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            Phase::Presenting => self.questions.get(self.index),
            _ => None,
        }
    }

    /// Value previously recorded for the question on screen, if any.
    pub fn current_value(&self) -> Option<i16> {
        self.values.get(self.index).copied().flatten()
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn answered_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn use_ai(&self) -> bool {
        self.use_ai
    }

    /// Records `value` for the current question and moves forward. The
    /// index stays on the last question once the end is reached.
    pub fn answer(&mut self, value: i16) -> Result<Progress, FlowError> {
        if self.phase != Phase::Presenting {
            return Err(FlowError::NotPresenting);
        }
        let question = self.questions.get(self.index).ok_or(FlowError::NotPresenting)?;
        if !question.accepts(value) {
            return Err(FlowError::InvalidValue(value));
        }
        self.values[self.index] = Some(value);

        if self.index + 1 < self.questions.len() {
            self.index += 1;
            Ok(Progress::Next(self.index))
        } else {
            Ok(Progress::ReadyToSubmit)
        }
    }

    /// Steps back one question; stored answers are kept.
    pub fn previous(&mut self) -> Result<usize, FlowError> {
        if self.phase != Phase::Presenting {
            return Err(FlowError::NotPresenting);
        }
        self.index = self.index.saturating_sub(1);
        Ok(self.index)
    }

    pub fn needs_adaptive(&self) -> bool {
        self.use_ai
            && !self.adaptive
            && self.phase == Phase::Presenting
            && self.answered_count() >= self.adaptive_threshold
    }

    /// Appends generated questions after the existing sequence. Happens at
    /// most once per session.
    pub fn enter_adaptive(&mut self, questions: Vec<Question>) -> Result<(), FlowError> {
        if self.adaptive {
            return Err(FlowError::AlreadyAdaptive);
        }
        if self.phase != Phase::Presenting {
            return Err(FlowError::NotPresenting);
        }
        let old_len = self.questions.len();
        let appended = questions.len();
        self.questions.extend(questions);
        self.values.extend(std::iter::repeat(None).take(appended));
        self.adaptive = true;

        // sitting on an answered final question: move onto the new batch
        if appended > 0 && self.index + 1 == old_len && self.values[self.index].is_some() {
            self.index = old_len;
        }
        Ok(())
    }

    pub fn answers(&self) -> Vec<Answer> {
        self.questions
            .iter()
            .zip(&self.values)
            .filter_map(|(q, v)| {
                v.map(|value| Answer {
                    question_id: q.id.clone(),
                    value,
                    category: q.category,
                    question_text: Some(q.text.clone()),
                })
            })
            .collect()
    }

    pub fn current_scores(&self) -> TraitScores {
        scoring::score_answers(&self.answers())
    }

    pub fn begin_submit(&mut self) -> Result<Vec<Answer>, FlowError> {
        if self.phase != Phase::Presenting {
            return Err(FlowError::NotPresenting);
        }
        let missing = self.values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            return Err(FlowError::Incomplete { missing });
        }
        self.phase = Phase::Submitting;
        Ok(self.answers())
    }

    pub fn submission_succeeded(&mut self) -> Result<(), FlowError> {
        if self.phase != Phase::Submitting {
            return Err(FlowError::NotSubmitting);
        }
        self.phase = Phase::Complete;
        Ok(())
    }

    /// Back to the last question so the user can retry.
    pub fn submission_failed(&mut self) -> Result<(), FlowError> {
        if self.phase != Phase::Submitting {
            return Err(FlowError::NotSubmitting);
        }
        self.phase = Phase::Presenting;
        self.index = self.questions.len().saturating_sub(1);
        Ok(())
    }
}
