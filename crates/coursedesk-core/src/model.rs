//! Core data model types for coursedesk.
//!
//! These mirror the records the backend stores. The wire format is JSON with
//! camelCase fields and SCREAMING_SNAKE_CASE tags, so the same types work
//! against the RPC backend and the local data file.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A logged-in or listed user, discriminated by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum User {
    Teacher(Teacher),
    Student(Student),
}

impl User {
    pub fn id(&self) -> &str {
        match self {
            User::Teacher(t) => &t.id,
            User::Student(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            User::Teacher(t) => &t.name,
            User::Student(s) => &s.name,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            User::Teacher(t) => &t.username,
            User::Student(s) => &s.username,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            User::Teacher(_) => Role::Teacher,
            User::Student(_) => Role::Student,
        }
    }

    pub fn as_student(&self) -> Option<&Student> {
        match self {
            User::Student(s) => Some(s),
            User::Teacher(_) => None,
        }
    }
}

/// The two roles a user can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Teacher,
    Student,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Teacher => write!(f, "teacher"),
            Role::Student => write!(f, "student"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// The one class this student belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    /// Date of birth as entered (free-form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
}

/// Input for creating a student account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub username: String,
    /// Initial password. Accounts created without one cannot log in until a
    /// password is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Classes and curriculum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    /// Display name, e.g. "7A1".
    pub name: String,
    pub teacher_id: String,
    /// Number of students whose `class_id` is this class. Maintained by the
    /// student mutations; never recomputed on read.
    #[serde(default)]
    pub student_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homeroom_teacher: Option<String>,
    /// Enrollment token. Opaque; not validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClass {
    pub name: String,
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homeroom_teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub subject_id: String,
    pub title: String,
    pub order: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTopic {
    pub subject_id: String,
    pub title: String,
    pub order: u32,
}

/// Publication state of a lesson. Students only see published lessons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LessonStatus {
    #[default]
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub topic_id: String,
    pub title: String,
    /// HTML or Markdown body.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(default)]
    pub status: LessonStatus,
    pub order: u32,
}

impl Lesson {
    pub fn is_published(&self) -> bool {
        self.status == LessonStatus::Published
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub topic_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(default)]
    pub status: LessonStatus,
    pub order: u32,
}

/// Sort siblings by display order. Stable, so equal orders keep their
/// insertion order.
pub fn sort_by_order<T>(items: &mut [T], order: impl Fn(&T) -> u32) {
    items.sort_by_key(|item| order(item));
}

// ---------------------------------------------------------------------------
// Assignments, submissions, progress
// ---------------------------------------------------------------------------

/// How a student hands in an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentType {
    /// Free text typed into the form.
    #[default]
    Essay,
    /// A link to an externally hosted file.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub due_date: DateTime<Utc>,
    pub max_score: f64,
    #[serde(rename = "type", default)]
    pub kind: AssignmentType,
    /// Advisory grading criteria; not machine-checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,
}

impl Assignment {
    /// Whether a submission made at `submitted_at` is late.
    pub fn is_late(&self, submitted_at: DateTime<Utc>) -> bool {
        submitted_at > self.due_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub due_date: DateTime<Utc>,
    pub max_score: f64,
    #[serde(rename = "type", default)]
    pub kind: AssignmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    /// Display helper filled in by some backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    /// Essay text or file link.
    #[serde(default)]
    pub content: String,
    #[serde(with = "timestamp")]
    pub submitted_at: DateTime<Utc>,
    /// `None` means ungraded, not zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Submission {
    pub fn is_graded(&self) -> bool {
        self.grade.is_some()
    }
}

/// A student's hand-in. Upserted by (assignment_id, student_id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub assignment_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub student_id: String,
    pub lesson_id: String,
    pub completed: bool,
    #[serde(with = "timestamp")]
    pub last_access: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Announcements
// ---------------------------------------------------------------------------

/// Who an announcement is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
    #[default]
    All,
    Student,
    Parent,
}

impl Audience {
    /// Whether students see this on their dashboard.
    pub fn reaches_students(self) -> bool {
        matches!(self, Audience::All | Audience::Student)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub class_id: String,
    pub teacher_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub target: Audience,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncement {
    pub class_id: String,
    pub teacher_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub target: Audience,
}

// ---------------------------------------------------------------------------
// Question bank
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "EASY"),
            Difficulty::Medium => write!(f, "MEDIUM"),
            Difficulty::Hard => write!(f, "HARD"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EASY" => Ok(Difficulty::Easy),
            "MEDIUM" => Ok(Difficulty::Medium),
            "HARD" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// The type tag of a question, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    FillInTheBlank,
    Ordering,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [
        QuestionType::MultipleChoice,
        QuestionType::ShortAnswer,
        QuestionType::FillInTheBlank,
        QuestionType::Ordering,
    ];
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::MultipleChoice => write!(f, "MULTIPLE_CHOICE"),
            QuestionType::ShortAnswer => write!(f, "SHORT_ANSWER"),
            QuestionType::FillInTheBlank => write!(f, "FILL_IN_THE_BLANK"),
            QuestionType::Ordering => write!(f, "ORDERING"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MULTIPLE_CHOICE" => Ok(QuestionType::MultipleChoice),
            "SHORT_ANSWER" => Ok(QuestionType::ShortAnswer),
            "FILL_IN_THE_BLANK" => Ok(QuestionType::FillInTheBlank),
            "ORDERING" => Ok(QuestionType::Ordering),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Type-specific payload of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<String>,
        correct_answer: String,
    },
    ShortAnswer {
        correct_answer: String,
    },
    /// `correct_answer` fills the content's `___` marker.
    FillInTheBlank {
        correct_answer: String,
    },
    /// Steps in their correct order. Learners see `options` shuffled;
    /// `correct_answer` is kept identical to `options`.
    Ordering {
        options: Vec<String>,
        correct_answer: Vec<String>,
    },
}

impl QuestionKind {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionKind::ShortAnswer { .. } => QuestionType::ShortAnswer,
            QuestionKind::FillInTheBlank { .. } => QuestionType::FillInTheBlank,
            QuestionKind::Ordering { .. } => QuestionType::Ordering,
        }
    }

    pub fn options(&self) -> &[String] {
        match self {
            QuestionKind::MultipleChoice { options, .. }
            | QuestionKind::Ordering { options, .. } => options,
            QuestionKind::ShortAnswer { .. } | QuestionKind::FillInTheBlank { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        self.kind.question_type()
    }
}

/// A question before the backend has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl NewQuestion {
    pub fn with_id(self, id: impl Into<String>) -> Question {
        Question {
            id: id.into(),
            subject_id: self.subject_id,
            topic_id: self.topic_id,
            difficulty: self.difficulty,
            content: self.content,
            explanation: self.explanation,
            kind: self.kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde adapter for timestamp fields: writes RFC 3339, reads RFC 3339 or a
/// bare date.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
