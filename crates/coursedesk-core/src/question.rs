//! Question validation and answer grading.
//!
//! All four question types share one record; [`validate`] enforces each
//! type's shape before a question is stored, and [`grade`] checks a learner's
//! answer regardless of type.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{NewQuestion, Question, QuestionKind};

/// Most options a multiple-choice question may carry.
pub const MAX_OPTIONS: usize = 4;

/// Validate and normalize a stored question in place.
///
/// Blank option slots are dropped and at most [`MAX_OPTIONS`] may remain.
/// For `ORDERING`, the correct answer is set to the option list: the
/// authored order *is* the answer.
pub fn validate(question: &mut Question) -> Result<(), ValidationError> {
    check(&question.content, &mut question.kind)
}

/// [`validate`] for a question that has no id yet.
pub fn validate_new(question: &mut NewQuestion) -> Result<(), ValidationError> {
    check(&question.content, &mut question.kind)
}

fn check(content: &str, kind: &mut QuestionKind) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::MissingContent);
    }

    match kind {
        QuestionKind::MultipleChoice {
            options,
            correct_answer,
        } => {
            options.retain(|o| !o.trim().is_empty());
            if correct_answer.trim().is_empty() {
                return Err(ValidationError::MissingCorrectAnswer);
            }
            if options.len() > MAX_OPTIONS {
                return Err(ValidationError::TooManyOptions {
                    count: options.len(),
                    max: MAX_OPTIONS,
                });
            }
            if !options.iter().any(|o| o == correct_answer) {
                return Err(ValidationError::AnswerNotInOptions {
                    answer: correct_answer.clone(),
                });
            }
        }
        QuestionKind::ShortAnswer { correct_answer }
        | QuestionKind::FillInTheBlank { correct_answer } => {
            if correct_answer.trim().is_empty() {
                return Err(ValidationError::MissingCorrectAnswer);
            }
        }
        QuestionKind::Ordering {
            options,
            correct_answer,
        } => {
            options.retain(|o| !o.trim().is_empty());
            if options.is_empty() {
                return Err(ValidationError::MissingCorrectAnswer);
            }
            correct_answer.clone_from(options);
        }
    }

    Ok(())
}

/// A learner's response to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// Chosen option, typed answer or blank filler.
    Text(String),
    /// Steps in the order the learner arranged them.
    Sequence(Vec<String>),
}

impl From<&str> for Answer {
    fn from(s: &str) -> Self {
        Answer::Text(s.to_string())
    }
}

impl From<Vec<String>> for Answer {
    fn from(v: Vec<String>) -> Self {
        Answer::Sequence(v)
    }
}

/// How strictly answers are compared.
///
/// The default is exact: case-sensitive, untrimmed, all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingPolicy {
    /// Compare text answers case-insensitively when `false`.
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    /// Ignore leading and trailing whitespace.
    #[serde(default)]
    pub trim_whitespace: bool,
    /// Score orderings by the fraction of steps in the right position.
    #[serde(default)]
    pub ordering_partial_credit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self::exact()
    }
}

impl GradingPolicy {
    pub fn exact() -> Self {
        Self {
            case_sensitive: true,
            trim_whitespace: false,
            ordering_partial_credit: false,
        }
    }

    /// Case-insensitive, whitespace-trimmed comparison.
    pub fn lenient() -> Self {
        Self {
            case_sensitive: false,
            trim_whitespace: true,
            ordering_partial_credit: false,
        }
    }

    fn same(&self, expected: &str, given: &str) -> bool {
        let (expected, given) = if self.trim_whitespace {
            (expected.trim(), given.trim())
        } else {
            (expected, given)
        };
        if self.case_sensitive {
            expected == given
        } else {
            expected.to_lowercase() == given.to_lowercase()
        }
    }
}

/// Exact grading: `true` when the answer is fully correct.
pub fn grade(question: &Question, answer: &Answer) -> bool {
    grade_with(question, answer, &GradingPolicy::exact())
}

/// Grade under a policy: `true` only for full credit.
pub fn grade_with(question: &Question, answer: &Answer, policy: &GradingPolicy) -> bool {
    score(question, answer, policy) >= 1.0
}

/// Credit in `0.0..=1.0` for an answer.
///
/// A text answer to an ordering question (or a sequence answer to any other
/// type) scores zero.
pub fn score(question: &Question, answer: &Answer, policy: &GradingPolicy) -> f64 {
    match (&question.kind, answer) {
        (
            QuestionKind::MultipleChoice { correct_answer, .. }
            | QuestionKind::ShortAnswer { correct_answer }
            | QuestionKind::FillInTheBlank { correct_answer },
            Answer::Text(given),
        ) => {
            if policy.same(correct_answer, given) {
                1.0
            } else {
                0.0
            }
        }
        (QuestionKind::Ordering { correct_answer, .. }, Answer::Sequence(given)) => {
            if correct_answer.is_empty() {
                return 0.0;
            }
            let in_place = correct_answer
                .iter()
                .zip(given)
                .filter(|(expected, got)| policy.same(expected, got))
                .count();
            if in_place == correct_answer.len() && given.len() == correct_answer.len() {
                1.0
            } else if policy.ordering_partial_credit {
                // Extra steps beyond the expected length dilute the credit.
                in_place as f64 / correct_answer.len().max(given.len()) as f64
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

impl Answer {
    /// Read a typed response for `question`. Ordering responses are a
    /// comma-separated list of steps, as in a question sheet.
    pub fn parse_for(question: &Question, raw: &str) -> Self {
        match question.kind {
            QuestionKind::Ordering { .. } => Answer::Sequence(
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => Answer::Text(raw.to_string()),
        }
    }
}

/// Credit earned on one question of a quiz.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemScore {
    pub question_id: String,
    pub credit: f64,
    pub correct: bool,
}

/// Per-question credit for a set of answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub items: Vec<ItemScore>,
    pub total: f64,
}

impl QuizScore {
    /// Total credit as a rounded percentage of the questions answered.
    pub fn percent(&self) -> u32 {
        if self.items.is_empty() {
            return 0;
        }
        (100.0 * self.total / self.items.len() as f64).round() as u32
    }
}

/// Score each (question, answer) pair under `policy`.
pub fn score_quiz(answers: &[(&Question, Answer)], policy: &GradingPolicy) -> QuizScore {
    let items: Vec<ItemScore> = answers
        .iter()
        .map(|(question, answer)| {
            let credit = score(question, answer, policy);
            ItemScore {
                question_id: question.id.clone(),
                credit,
                correct: credit >= 1.0,
            }
        })
        .collect();
    let total = items.iter().map(|i| i.credit).sum();
    QuizScore { items, total }
}
