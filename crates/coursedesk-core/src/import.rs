//! Tabular question import/export.
//!
//! A sheet row is (content, type, difficulty, correct answer, explanation,
//! option 1..4). [`question_from_row`] and [`question_to_row`] convert between
//! rows and questions. [`read_rows`] and [`write_rows`] move rows through CSV.
//! Answer sheets for grading are read with [`read_answers`].

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::model::{Difficulty, NewQuestion, Question, QuestionKind, QuestionType};
use crate::question;

/// Header labels written by [`write_rows`].
pub const HEADERS: [&str; 9] = [
    "content",
    "type",
    "difficulty",
    "correct_answer",
    "explanation",
    "option_1",
    "option_2",
    "option_3",
    "option_4",
];

/// One sheet row. Missing trailing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRow {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub option_1: String,
    #[serde(default)]
    pub option_2: String,
    #[serde(default)]
    pub option_3: String,
    #[serde(default)]
    pub option_4: String,
}

impl QuestionRow {
    /// Build a row from positional cells, as a spreadsheet reader yields them.
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Self {
        let cell = |i: usize| {
            cells
                .get(i)
                .map(|c| c.as_ref().to_string())
                .unwrap_or_default()
        };
        Self {
            content: cell(0),
            question_type: cell(1),
            difficulty: cell(2),
            correct_answer: cell(3),
            explanation: cell(4),
            option_1: cell(5),
            option_2: cell(6),
            option_3: cell(7),
            option_4: cell(8),
        }
    }

    /// Non-empty option cells, in column order.
    pub fn options(&self) -> Vec<String> {
        [&self.option_1, &self.option_2, &self.option_3, &self.option_4]
            .into_iter()
            .filter(|o| !o.is_empty())
            .cloned()
            .collect()
    }

    fn set_options(&mut self, options: &[String]) {
        let mut slots = options.iter().cloned();
        self.option_1 = slots.next().unwrap_or_default();
        self.option_2 = slots.next().unwrap_or_default();
        self.option_3 = slots.next().unwrap_or_default();
        self.option_4 = slots.next().unwrap_or_default();
    }
}

/// Why a row could not become a question.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error("unknown question type: {0}")]
    UnknownType(String),

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Convert a row into a validated question draft.
///
/// Returns `Ok(None)` for a row with no content (blank rows are skipped).
/// Type defaults to `MULTIPLE_CHOICE` and difficulty to `MEDIUM`.
pub fn question_from_row(
    row: &QuestionRow,
    subject_id: Option<&str>,
    topic_id: Option<&str>,
) -> Result<Option<NewQuestion>, ImportError> {
    if row.content.trim().is_empty() {
        return Ok(None);
    }

    let question_type = match row.question_type.trim() {
        "" => QuestionType::MultipleChoice,
        raw => raw
            .parse()
            .map_err(|_| ImportError::UnknownType(raw.to_string()))?,
    };
    let difficulty = match row.difficulty.trim() {
        "" => Difficulty::Medium,
        raw => raw
            .parse()
            .map_err(|_| ImportError::UnknownDifficulty(raw.to_string()))?,
    };

    let correct_answer = row.correct_answer.trim().to_string();
    let options = row.options();

    let kind = match question_type {
        QuestionType::MultipleChoice => QuestionKind::MultipleChoice {
            options,
            correct_answer,
        },
        QuestionType::ShortAnswer => QuestionKind::ShortAnswer { correct_answer },
        QuestionType::FillInTheBlank => QuestionKind::FillInTheBlank { correct_answer },
        QuestionType::Ordering => {
            let steps: Vec<String> = correct_answer
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            QuestionKind::Ordering {
                options: if options.is_empty() {
                    steps.clone()
                } else {
                    options
                },
                correct_answer: steps,
            }
        }
    };

    let explanation = match row.explanation.trim() {
        "" => None,
        _ => Some(row.explanation.clone()),
    };

    let mut draft = NewQuestion {
        subject_id: subject_id.map(Into::into),
        topic_id: topic_id.map(Into::into),
        difficulty,
        content: row.content.clone(),
        explanation,
        kind,
    };
    question::validate_new(&mut draft)?;
    Ok(Some(draft))
}

/// Convert a question back into a row.
///
/// Orderings are written as a comma-joined answer. When there are more steps
/// than option columns, the option cells stay empty so that re-importing
/// rebuilds every step from the answer.
pub fn question_to_row(question: &Question) -> QuestionRow {
    let mut row = QuestionRow {
        content: question.content.clone(),
        question_type: question.question_type().to_string(),
        difficulty: question.difficulty.to_string(),
        explanation: question.explanation.clone().unwrap_or_default(),
        ..QuestionRow::default()
    };

    match &question.kind {
        QuestionKind::MultipleChoice {
            options,
            correct_answer,
        } => {
            row.correct_answer = correct_answer.clone();
            row.set_options(options);
        }
        QuestionKind::ShortAnswer { correct_answer }
        | QuestionKind::FillInTheBlank { correct_answer } => {
            row.correct_answer = correct_answer.clone();
        }
        QuestionKind::Ordering { correct_answer, .. } => {
            row.correct_answer = correct_answer.join(",");
            if correct_answer.len() <= 4 {
                row.set_options(correct_answer);
            }
        }
    }

    row
}

/// One illustrative row per question type, for a blank import sheet.
pub fn template_rows() -> Vec<QuestionRow> {
    vec![
        QuestionRow::from_cells(&[
            "Which of these is an output device?",
            "MULTIPLE_CHOICE",
            "EASY",
            "Monitor",
            "A monitor displays data from the computer.",
            "Monitor",
            "Keyboard",
            "Mouse",
            "Microphone",
        ]),
        QuestionRow::from_cells(&[
            "What does CPU stand for?",
            "SHORT_ANSWER",
            "MEDIUM",
            "Central Processing Unit",
            "The CPU executes program instructions.",
        ]),
        QuestionRow::from_cells(&[
            "Fill in the blank: a ___ is an input device.",
            "FILL_IN_THE_BLANK",
            "MEDIUM",
            "keyboard",
            "Use ___ to mark the blank.",
        ]),
        QuestionRow::from_cells(&[
            "Put the start-up steps in order",
            "ORDERING",
            "HARD",
            "Plug in,Press the power button,Log in",
            "Separate steps with commas.",
            "Plug in",
            "Press the power button",
            "Log in",
        ]),
    ]
}

/// A row that failed to import.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    /// 1-based data row number (the header row is not counted).
    pub row: usize,
    pub error: ImportError,
}

/// Outcome of importing a sheet.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub questions: Vec<NewQuestion>,
    pub skipped_blank: usize,
    pub failures: Vec<RowFailure>,
}

/// Convert every row, collecting failures instead of stopping at the first.
pub fn import_questions(
    rows: &[QuestionRow],
    subject_id: Option<&str>,
    topic_id: Option<&str>,
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for (i, row) in rows.iter().enumerate() {
        match question_from_row(row, subject_id, topic_id) {
            Ok(Some(q)) => summary.questions.push(q),
            Ok(None) => summary.skipped_blank += 1,
            Err(error) => {
                tracing::warn!("skipping row {}: {}", i + 1, error);
                summary.failures.push(RowFailure { row: i + 1, error });
            }
        }
    }
    summary
}

/// Read rows from CSV with a header row. Short rows are padded with empty
/// cells.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<QuestionRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<&str> = record.iter().collect();
        rows.push(QuestionRow::from_cells(cells.as_slice()));
    }
    Ok(rows)
}

/// Write rows as CSV, preceded by [`HEADERS`].
pub fn write_rows<W: Write>(writer: W, rows: &[QuestionRow]) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// One line of an answer sheet: `question_id,answer`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerRow {
    pub question_id: String,
    #[serde(default)]
    pub answer: String,
}

/// Read an answer sheet with a `question_id,answer` header row.
pub fn read_answers<R: Read>(reader: R) -> Result<Vec<AnswerRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    reader.deserialize().collect()
}
