//! The data access contract.
//!
//! Everything above the storage layer talks to a [`DataProvider`]. The
//! `coursedesk-providers` crate implements it over an HTTP-RPC endpoint and
//! over an in-memory store, and the two are interchangeable.

use async_trait::async_trait;

use crate::error::DataResult;
use crate::filter::ListFilter;
use crate::model::{
    Announcement, Assignment, Class, Lesson, NewAnnouncement, NewAssignment, NewClass, NewLesson,
    NewQuestion, NewStudent, NewSubject, NewSubmission, NewTopic, Progress, Question, Student,
    Subject, Submission, Topic, User,
};

/// A backend holding the authoritative copy of every record.
///
/// Upserts (`submit_assignment`, `mark_lesson_complete`) are keyed by natural
/// key and safe to repeat. `create_*` calls are not: each one creates a new
/// record.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Human-readable backend name (e.g. "rpc").
    fn name(&self) -> &str;

    // -- auth ---------------------------------------------------------------

    /// Check a username/password pair and return the matching user.
    async fn login(&self, username: &str, password: &str) -> DataResult<User>;

    // -- students -----------------------------------------------------------

    async fn list_students(&self, filter: &ListFilter) -> DataResult<Vec<Student>>;
    async fn create_student(&self, student: NewStudent) -> DataResult<Student>;
    /// Replace a student record. `new_password`, when given, replaces the
    /// stored credential; otherwise the old one is kept.
    async fn update_student(
        &self,
        student: Student,
        new_password: Option<String>,
    ) -> DataResult<Student>;
    async fn delete_student(&self, id: &str) -> DataResult<()>;

    // -- classes ------------------------------------------------------------

    async fn list_classes(&self, filter: &ListFilter) -> DataResult<Vec<Class>>;
    async fn create_class(&self, class: NewClass) -> DataResult<Class>;
    async fn update_class(&self, class: Class) -> DataResult<Class>;
    async fn delete_class(&self, id: &str) -> DataResult<()>;

    // -- curriculum ---------------------------------------------------------

    async fn list_subjects(&self, filter: &ListFilter) -> DataResult<Vec<Subject>>;
    async fn create_subject(&self, subject: NewSubject) -> DataResult<Subject>;
    async fn update_subject(&self, subject: Subject) -> DataResult<Subject>;
    async fn delete_subject(&self, id: &str) -> DataResult<()>;

    /// Topics in ascending display order.
    async fn list_topics(&self, filter: &ListFilter) -> DataResult<Vec<Topic>>;
    async fn create_topic(&self, topic: NewTopic) -> DataResult<Topic>;
    async fn update_topic(&self, topic: Topic) -> DataResult<Topic>;
    async fn delete_topic(&self, id: &str) -> DataResult<()>;

    /// Lessons in ascending display order.
    async fn list_lessons(&self, filter: &ListFilter) -> DataResult<Vec<Lesson>>;
    async fn create_lesson(&self, lesson: NewLesson) -> DataResult<Lesson>;
    async fn update_lesson(&self, lesson: Lesson) -> DataResult<Lesson>;
    async fn delete_lesson(&self, id: &str) -> DataResult<()>;

    // -- assignments and submissions ----------------------------------------

    async fn list_assignments(&self, filter: &ListFilter) -> DataResult<Vec<Assignment>>;
    async fn create_assignment(&self, assignment: NewAssignment) -> DataResult<Assignment>;
    async fn update_assignment(&self, assignment: Assignment) -> DataResult<Assignment>;
    async fn delete_assignment(&self, id: &str) -> DataResult<()>;

    async fn list_submissions(&self, filter: &ListFilter) -> DataResult<Vec<Submission>>;
    /// Create or overwrite the submission for (assignment, student) and
    /// refresh its timestamp.
    async fn submit_assignment(&self, submission: NewSubmission) -> DataResult<Submission>;
    async fn grade_submission(
        &self,
        submission_id: &str,
        grade: f64,
        feedback: &str,
    ) -> DataResult<Submission>;

    // -- progress -----------------------------------------------------------

    async fn list_progress(&self, filter: &ListFilter) -> DataResult<Vec<Progress>>;
    /// Idempotent; a completed lesson stays completed.
    async fn mark_lesson_complete(&self, student_id: &str, lesson_id: &str)
        -> DataResult<Progress>;

    // -- announcements ------------------------------------------------------

    /// Announcements, newest first.
    async fn list_announcements(&self, filter: &ListFilter) -> DataResult<Vec<Announcement>>;
    async fn create_announcement(&self, announcement: NewAnnouncement)
        -> DataResult<Announcement>;

    // -- question bank ------------------------------------------------------

    async fn list_questions(&self, filter: &ListFilter) -> DataResult<Vec<Question>>;
    async fn create_question(&self, question: NewQuestion) -> DataResult<Question>;
    async fn update_question(&self, question: Question) -> DataResult<Question>;
    async fn delete_question(&self, id: &str) -> DataResult<()>;
}
