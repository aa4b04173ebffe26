//! In-memory data provider with optional JSON file persistence.
//!
//! Every mutation runs against a copy of the database; the copy replaces the
//! live state only after it has been validated and written to disk, so a
//! failed call changes nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use coursedesk_core::error::{DataError, DataResult, ValidationError};
use coursedesk_core::filter::ListFilter;
use coursedesk_core::model::{
    parse_timestamp, sort_by_order, Announcement, Assignment, AssignmentType, Audience, Class,
    Difficulty, Lesson, LessonStatus, NewAnnouncement, NewAssignment, NewClass, NewLesson,
    NewQuestion, NewStudent, NewSubject, NewSubmission, NewTopic, Progress, Question,
    QuestionKind, Student, Subject, Submission, Teacher, Topic, User,
};
use coursedesk_core::question;
use coursedesk_core::traits::DataProvider;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A salted SHA-256 password digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Credential {
    salt: String,
    digest: String,
}

impl Credential {
    fn new(password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = Self::hash(&salt, password);
        Self { salt, digest }
    }

    fn hash(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn verify(&self, password: &str) -> bool {
        Self::hash(&self.salt, password) == self.digest
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Database {
    users: Vec<User>,
    /// Keyed by user id.
    #[serde(default)]
    credentials: HashMap<String, Credential>,
    classes: Vec<Class>,
    subjects: Vec<Subject>,
    topics: Vec<Topic>,
    lessons: Vec<Lesson>,
    assignments: Vec<Assignment>,
    submissions: Vec<Submission>,
    /// Newest first.
    announcements: Vec<Announcement>,
    progress: Vec<Progress>,
    questions: Vec<Question>,
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn require(field: &'static str, value: &str) -> DataResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field).into())
    } else {
        Ok(())
    }
}

impl Database {
    fn student_mut(&mut self, id: &str) -> Option<&mut Student> {
        self.users.iter_mut().find_map(|u| match u {
            User::Student(s) if s.id == id => Some(s),
            _ => None,
        })
    }

    fn class_mut(&mut self, id: &str) -> DataResult<&mut Class> {
        self.classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DataError::not_found("class", id))
    }

    /// Fail when another user (teacher or student) already has `username`.
    fn claim_username(&self, username: &str, owner: Option<&str>) -> DataResult<()> {
        let taken = self
            .users
            .iter()
            .any(|u| u.username() == username && Some(u.id()) != owner);
        if taken {
            return Err(ValidationError::DuplicateUsername(username.to_string()).into());
        }
        Ok(())
    }

    fn has_class(&self, id: &str) -> bool {
        self.classes.iter().any(|c| c.id == id)
    }

    fn enroll(&mut self, class_id: Option<&str>) -> DataResult<()> {
        if let Some(id) = class_id {
            self.class_mut(id)?.student_count += 1;
        }
        Ok(())
    }

    fn unenroll(&mut self, class_id: Option<&str>) {
        if let Some(class) = class_id.and_then(|id| self.classes.iter_mut().find(|c| c.id == id)) {
            class.student_count = class.student_count.saturating_sub(1);
        }
    }

    /// Remove lessons matching `doomed`, dropping their progress and
    /// detaching assignments that pointed at them.
    fn remove_lessons(&mut self, doomed: impl Fn(&Lesson) -> bool) {
        let removed: Vec<String> = self
            .lessons
            .iter()
            .filter(|l| doomed(l))
            .map(|l| l.id.clone())
            .collect();
        if removed.is_empty() {
            return;
        }
        self.lessons.retain(|l| !removed.contains(&l.id));
        self.progress.retain(|p| !removed.contains(&p.lesson_id));
        for assignment in &mut self.assignments {
            if assignment
                .lesson_id
                .as_ref()
                .is_some_and(|id| removed.contains(id))
            {
                assignment.lesson_id = None;
            }
        }
    }
}

/// Replace the record whose id matches, or fail with `NotFound`.
fn replace<T: Clone>(
    items: &mut [T],
    entity: &'static str,
    id_of: impl Fn(&T) -> &str,
    value: T,
) -> DataResult<T> {
    let id = id_of(&value).to_string();
    let slot = items
        .iter_mut()
        .find(|item| id_of(&**item) == id)
        .ok_or_else(|| DataError::not_found(entity, id))?;
    *slot = value.clone();
    Ok(value)
}

/// Remove the record with `id`, or fail with `NotFound`.
fn remove<T>(
    items: &mut Vec<T>,
    entity: &'static str,
    id_of: impl Fn(&T) -> &str,
    id: &str,
) -> DataResult<T> {
    let pos = items
        .iter()
        .position(|item| id_of(item) == id)
        .ok_or_else(|| DataError::not_found(entity, id))?;
    Ok(items.remove(pos))
}

/// A self-contained backend keeping every record in memory.
///
/// With a data file, the database is loaded from it on open and rewritten
/// after each successful mutation.
pub struct MemoryProvider {
    db: Mutex<Database>,
    data_file: Option<PathBuf>,
    clock: Clock,
}

impl MemoryProvider {
    /// An empty store.
    pub fn new() -> Self {
        Self::from_database(Database::default())
    }

    /// A store holding the demo school: one teacher, three students in two
    /// classes, one subject with lessons, assignments and a question bank.
    ///
    /// Demo accounts get `password` when a non-empty one is given; otherwise
    /// they exist but cannot log in.
    pub fn seeded(password: Option<&str>) -> Self {
        Self::from_database(seed_database(password))
    }

    /// Open a store backed by `path`. A missing file is created, seeded with
    /// the demo data when `seed` is true.
    ///
    /// Seeding a new file requires a non-empty `seed_password`: the demo
    /// accounts' credentials are fixed once the file is written.
    pub fn open(path: &Path, seed: bool, seed_password: Option<&str>) -> DataResult<Self> {
        let db = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                DataError::Storage(format!("failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                DataError::Storage(format!("failed to parse {}: {e}", path.display()))
            })?
        } else if seed {
            if !matches!(seed_password, Some(pw) if !pw.is_empty()) {
                return Err(ValidationError::MissingField("seed_password").into());
            }
            seed_database(seed_password)
        } else {
            Database::default()
        };

        let provider = Self {
            db: Mutex::new(db),
            data_file: Some(path.to_path_buf()),
            clock: Arc::new(Utc::now),
        };
        {
            let db = provider.lock()?;
            provider.persist(&db)?;
        }
        tracing::debug!(path = %path.display(), "opened memory store");
        Ok(provider)
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            data_file: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source used for submission, progress and
    /// announcement timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn lock(&self) -> DataResult<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| DataError::Storage("memory store lock poisoned".into()))
    }

    fn persist(&self, db: &Database) -> DataResult<()> {
        let Some(path) = &self.data_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DataError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(db)
            .map_err(|e| DataError::Storage(format!("failed to serialize store: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| DataError::Storage(format!("failed to write {}: {e}", path.display())))
    }

    fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> DataResult<T> {
        let db = self.lock()?;
        Ok(f(&db))
    }

    /// Apply `f` to a copy of the database and commit the copy only if `f`
    /// succeeds and the copy is persisted.
    fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Database) -> DataResult<T>,
    ) -> DataResult<T> {
        let mut db = self.lock()?;
        let mut next = db.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *db = next;
        tracing::debug!(op, "memory store updated");
        Ok(out)
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn login(&self, username: &str, password: &str) -> DataResult<User> {
        self.read(|db| {
            let user = db
                .users
                .iter()
                .find(|u| u.username() == username)
                .ok_or(DataError::InvalidCredentials)?;
            match db.credentials.get(user.id()) {
                Some(cred) if cred.verify(password) => Ok(user.clone()),
                _ => Err(DataError::InvalidCredentials),
            }
        })?
    }

    // -- students -----------------------------------------------------------

    async fn list_students(&self, filter: &ListFilter) -> DataResult<Vec<Student>> {
        self.read(|db| {
            let students: Vec<Student> =
                db.users.iter().filter_map(User::as_student).cloned().collect();
            filter.apply(students)
        })
    }

    async fn create_student(&self, student: NewStudent) -> DataResult<Student> {
        require("name", &student.name)?;
        require("username", &student.username)?;
        self.mutate("create_student", |db| {
            db.claim_username(&student.username, None)?;
            db.enroll(student.class_id.as_deref())?;
            let created = Student {
                id: new_id(),
                name: student.name,
                email: student.email,
                username: student.username,
                avatar: None,
                class_id: student.class_id,
                dob: student.dob,
                parent_phone: student.parent_phone,
            };
            if let Some(password) = student.password.as_deref().filter(|p| !p.is_empty()) {
                db.credentials.insert(created.id.clone(), Credential::new(password));
            }
            db.users.push(User::Student(created.clone()));
            Ok(created)
        })
    }

    async fn update_student(
        &self,
        student: Student,
        new_password: Option<String>,
    ) -> DataResult<Student> {
        require("name", &student.name)?;
        require("username", &student.username)?;
        self.mutate("update_student", |db| {
            let previous_class = db
                .student_mut(&student.id)
                .ok_or_else(|| DataError::not_found("student", &student.id))?
                .class_id
                .clone();
            db.claim_username(&student.username, Some(&student.id))?;

            if previous_class != student.class_id {
                db.enroll(student.class_id.as_deref())?;
                db.unenroll(previous_class.as_deref());
            }
            if let Some(password) = new_password.as_deref().filter(|p| !p.is_empty()) {
                db.credentials.insert(student.id.clone(), Credential::new(password));
            }
            if let Some(slot) = db.student_mut(&student.id) {
                *slot = student.clone();
            }
            Ok(student)
        })
    }

    async fn delete_student(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_student", |db| {
            let class_id = db
                .student_mut(id)
                .ok_or_else(|| DataError::not_found("student", id))?
                .class_id
                .clone();
            db.unenroll(class_id.as_deref());
            db.users.retain(|u| u.id() != id);
            db.credentials.remove(id);
            Ok(())
        })
    }

    // -- classes ------------------------------------------------------------

    async fn list_classes(&self, filter: &ListFilter) -> DataResult<Vec<Class>> {
        self.read(|db| filter.apply(db.classes.clone()))
    }

    async fn create_class(&self, class: NewClass) -> DataResult<Class> {
        require("name", &class.name)?;
        require("teacherId", &class.teacher_id)?;
        self.mutate("create_class", |db| {
            let created = Class {
                id: new_id(),
                name: class.name,
                teacher_id: class.teacher_id,
                student_count: 0,
                school_year: class.school_year,
                homeroom_teacher: class.homeroom_teacher,
                join_code: class.join_code,
            };
            db.classes.push(created.clone());
            Ok(created)
        })
    }

    async fn update_class(&self, mut class: Class) -> DataResult<Class> {
        require("name", &class.name)?;
        self.mutate("update_class", |db| {
            class.student_count = db.class_mut(&class.id)?.student_count;
            replace(&mut db.classes, "class", |c| c.id.as_str(), class)
        })
    }

    async fn delete_class(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_class", |db| {
            remove(&mut db.classes, "class", |c| c.id.as_str(), id)?;
            for user in &mut db.users {
                if let User::Student(s) = user {
                    if s.class_id.as_deref() == Some(id) {
                        s.class_id = None;
                    }
                }
            }
            Ok(())
        })
    }

    // -- curriculum ---------------------------------------------------------

    async fn list_subjects(&self, filter: &ListFilter) -> DataResult<Vec<Subject>> {
        self.read(|db| filter.apply(db.subjects.clone()))
    }

    async fn create_subject(&self, subject: NewSubject) -> DataResult<Subject> {
        require("name", &subject.name)?;
        self.mutate("create_subject", |db| {
            let created = Subject {
                id: new_id(),
                name: subject.name,
                description: subject.description,
            };
            db.subjects.push(created.clone());
            Ok(created)
        })
    }

    async fn update_subject(&self, subject: Subject) -> DataResult<Subject> {
        require("name", &subject.name)?;
        self.mutate("update_subject", |db| {
            replace(&mut db.subjects, "subject", |s| s.id.as_str(), subject)
        })
    }

    async fn delete_subject(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_subject", |db| {
            remove(&mut db.subjects, "subject", |s| s.id.as_str(), id)?;
            let topics: Vec<String> = db
                .topics
                .iter()
                .filter(|t| t.subject_id == id)
                .map(|t| t.id.clone())
                .collect();
            db.topics.retain(|t| t.subject_id != id);
            db.remove_lessons(|l| topics.contains(&l.topic_id));
            Ok(())
        })
    }

    async fn list_topics(&self, filter: &ListFilter) -> DataResult<Vec<Topic>> {
        self.read(|db| {
            let mut topics = filter.apply(db.topics.clone());
            sort_by_order(&mut topics, |t| t.order);
            topics
        })
    }

    async fn create_topic(&self, topic: NewTopic) -> DataResult<Topic> {
        require("title", &topic.title)?;
        self.mutate("create_topic", |db| {
            if !db.subjects.iter().any(|s| s.id == topic.subject_id) {
                return Err(DataError::not_found("subject", &topic.subject_id));
            }
            let created = Topic {
                id: new_id(),
                subject_id: topic.subject_id,
                title: topic.title,
                order: topic.order,
            };
            db.topics.push(created.clone());
            Ok(created)
        })
    }

    async fn update_topic(&self, topic: Topic) -> DataResult<Topic> {
        require("title", &topic.title)?;
        self.mutate("update_topic", |db| {
            if !db.subjects.iter().any(|s| s.id == topic.subject_id) {
                return Err(DataError::not_found("subject", &topic.subject_id));
            }
            replace(&mut db.topics, "topic", |t| t.id.as_str(), topic)
        })
    }

    async fn delete_topic(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_topic", |db| {
            remove(&mut db.topics, "topic", |t| t.id.as_str(), id)?;
            db.remove_lessons(|l| l.topic_id == id);
            Ok(())
        })
    }

    async fn list_lessons(&self, filter: &ListFilter) -> DataResult<Vec<Lesson>> {
        self.read(|db| {
            let mut lessons = filter.apply(db.lessons.clone());
            sort_by_order(&mut lessons, |l| l.order);
            lessons
        })
    }

    async fn create_lesson(&self, lesson: NewLesson) -> DataResult<Lesson> {
        require("title", &lesson.title)?;
        self.mutate("create_lesson", |db| {
            if !db.topics.iter().any(|t| t.id == lesson.topic_id) {
                return Err(DataError::not_found("topic", &lesson.topic_id));
            }
            let created = Lesson {
                id: new_id(),
                topic_id: lesson.topic_id,
                title: lesson.title,
                content: lesson.content,
                video_url: lesson.video_url,
                slide_url: lesson.slide_url,
                document_url: lesson.document_url,
                status: lesson.status,
                order: lesson.order,
            };
            db.lessons.push(created.clone());
            Ok(created)
        })
    }

    async fn update_lesson(&self, lesson: Lesson) -> DataResult<Lesson> {
        require("title", &lesson.title)?;
        self.mutate("update_lesson", |db| {
            if !db.topics.iter().any(|t| t.id == lesson.topic_id) {
                return Err(DataError::not_found("topic", &lesson.topic_id));
            }
            replace(&mut db.lessons, "lesson", |l| l.id.as_str(), lesson)
        })
    }

    async fn delete_lesson(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_lesson", |db| {
            if !db.lessons.iter().any(|l| l.id == id) {
                return Err(DataError::not_found("lesson", id));
            }
            db.remove_lessons(|l| l.id == id);
            Ok(())
        })
    }

    // -- assignments and submissions ----------------------------------------

    async fn list_assignments(&self, filter: &ListFilter) -> DataResult<Vec<Assignment>> {
        self.read(|db| filter.apply(db.assignments.clone()))
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> DataResult<Assignment> {
        require("title", &assignment.title)?;
        self.mutate("create_assignment", |db| {
            let created = Assignment {
                id: new_id(),
                lesson_id: assignment.lesson_id,
                title: assignment.title,
                description: assignment.description,
                due_date: assignment.due_date,
                max_score: assignment.max_score,
                kind: assignment.kind,
                rubric: assignment.rubric,
            };
            db.assignments.push(created.clone());
            Ok(created)
        })
    }

    async fn update_assignment(&self, assignment: Assignment) -> DataResult<Assignment> {
        require("title", &assignment.title)?;
        self.mutate("update_assignment", |db| {
            replace(&mut db.assignments, "assignment", |a| a.id.as_str(), assignment)
        })
    }

    async fn delete_assignment(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_assignment", |db| {
            remove(&mut db.assignments, "assignment", |a| a.id.as_str(), id)?;
            db.submissions.retain(|s| s.assignment_id != id);
            Ok(())
        })
    }

    async fn list_submissions(&self, filter: &ListFilter) -> DataResult<Vec<Submission>> {
        self.read(|db| filter.apply(db.submissions.clone()))
    }

    async fn submit_assignment(&self, submission: NewSubmission) -> DataResult<Submission> {
        require("content", &submission.content)?;
        let now = self.now();
        self.mutate("submit_assignment", |db| {
            if !db.assignments.iter().any(|a| a.id == submission.assignment_id) {
                return Err(DataError::not_found("assignment", &submission.assignment_id));
            }
            if db.student_mut(&submission.student_id).is_none() {
                return Err(DataError::not_found("student", &submission.student_id));
            }

            let existing = db.submissions.iter_mut().find(|s| {
                s.assignment_id == submission.assignment_id && s.student_id == submission.student_id
            });
            match existing {
                Some(record) => {
                    record.content = submission.content;
                    if submission.student_name.is_some() {
                        record.student_name = submission.student_name;
                    }
                    record.submitted_at = now;
                    Ok(record.clone())
                }
                None => {
                    let created = Submission {
                        id: new_id(),
                        assignment_id: submission.assignment_id,
                        student_id: submission.student_id,
                        student_name: submission.student_name,
                        content: submission.content,
                        submitted_at: now,
                        grade: None,
                        feedback: None,
                    };
                    db.submissions.push(created.clone());
                    Ok(created)
                }
            }
        })
    }

    async fn grade_submission(
        &self,
        submission_id: &str,
        grade: f64,
        feedback: &str,
    ) -> DataResult<Submission> {
        self.mutate("grade_submission", |db| {
            let assignment_id = db
                .submissions
                .iter()
                .find(|s| s.id == submission_id)
                .map(|s| s.assignment_id.clone())
                .ok_or_else(|| DataError::not_found("submission", submission_id))?;
            let max_score = db
                .assignments
                .iter()
                .find(|a| a.id == assignment_id)
                .map(|a| a.max_score)
                .ok_or_else(|| DataError::not_found("assignment", &assignment_id))?;
            if !grade.is_finite() || grade < 0.0 || grade > max_score {
                return Err(ValidationError::GradeOutOfRange { grade, max_score }.into());
            }

            let record = db
                .submissions
                .iter_mut()
                .find(|s| s.id == submission_id)
                .ok_or_else(|| DataError::not_found("submission", submission_id))?;
            record.grade = Some(grade);
            record.feedback = Some(feedback.to_string());
            Ok(record.clone())
        })
    }

    // -- progress -----------------------------------------------------------

    async fn list_progress(&self, filter: &ListFilter) -> DataResult<Vec<Progress>> {
        self.read(|db| filter.apply(db.progress.clone()))
    }

    async fn mark_lesson_complete(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> DataResult<Progress> {
        let now = self.now();
        self.mutate("mark_lesson_complete", |db| {
            if db.student_mut(student_id).is_none() {
                return Err(DataError::not_found("student", student_id));
            }
            if !db.lessons.iter().any(|l| l.id == lesson_id) {
                return Err(DataError::not_found("lesson", lesson_id));
            }
            let record = Progress {
                student_id: student_id.to_string(),
                lesson_id: lesson_id.to_string(),
                completed: true,
                last_access: now,
            };
            match db
                .progress
                .iter_mut()
                .find(|p| p.student_id == student_id && p.lesson_id == lesson_id)
            {
                Some(slot) => *slot = record.clone(),
                None => db.progress.push(record.clone()),
            }
            Ok(record)
        })
    }

    // -- announcements ------------------------------------------------------

    async fn list_announcements(&self, filter: &ListFilter) -> DataResult<Vec<Announcement>> {
        self.read(|db| {
            let mut items = filter.apply(db.announcements.clone());
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            items
        })
    }

    async fn create_announcement(&self, announcement: NewAnnouncement) -> DataResult<Announcement> {
        require("title", &announcement.title)?;
        require("content", &announcement.content)?;
        let now = self.now();
        self.mutate("create_announcement", |db| {
            if !db.has_class(&announcement.class_id) {
                return Err(DataError::not_found("class", &announcement.class_id));
            }
            let created = Announcement {
                id: new_id(),
                class_id: announcement.class_id,
                teacher_id: announcement.teacher_id,
                title: announcement.title,
                content: announcement.content,
                target: announcement.target,
                created_at: now,
            };
            db.announcements.insert(0, created.clone());
            Ok(created)
        })
    }

    // -- question bank ------------------------------------------------------

    async fn list_questions(&self, filter: &ListFilter) -> DataResult<Vec<Question>> {
        self.read(|db| filter.apply(db.questions.clone()))
    }

    async fn create_question(&self, mut question: NewQuestion) -> DataResult<Question> {
        question::validate_new(&mut question)?;
        self.mutate("create_question", |db| {
            let created = question.with_id(new_id());
            db.questions.push(created.clone());
            Ok(created)
        })
    }

    async fn update_question(&self, mut question: Question) -> DataResult<Question> {
        question::validate(&mut question)?;
        self.mutate("update_question", |db| {
            replace(&mut db.questions, "question", |q| q.id.as_str(), question)
        })
    }

    async fn delete_question(&self, id: &str) -> DataResult<()> {
        self.mutate("delete_question", |db| {
            remove(&mut db.questions, "question", |q| q.id.as_str(), id).map(|_| ())
        })
    }
}

// ---------------------------------------------------------------------------
// Demo data
// ---------------------------------------------------------------------------

fn date(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap_or_default()
}

fn seed_student(id: &str, name: &str, username: &str, class: &str, dob: &str, phone: &str) -> User {
    User::Student(Student {
        id: id.into(),
        name: name.into(),
        email: format!("{username}@school.edu"),
        username: username.into(),
        avatar: None,
        class_id: Some(class.into()),
        dob: Some(dob.into()),
        parent_phone: Some(phone.into()),
    })
}

fn seed_lesson(
    id: &str,
    topic: &str,
    title: &str,
    order: u32,
    status: LessonStatus,
    content: &str,
) -> Lesson {
    Lesson {
        id: id.into(),
        topic_id: topic.into(),
        title: title.into(),
        content: content.into(),
        video_url: None,
        slide_url: None,
        document_url: None,
        status,
        order,
    }
}

fn seed_database(password: Option<&str>) -> Database {
    let users = vec![
        User::Teacher(Teacher {
            id: "u1".into(),
            name: "An Nguyen".into(),
            email: "gv.an@school.edu".into(),
            username: "gv.an".into(),
            avatar: None,
        }),
        seed_student("u2", "Binh Tran", "hs.binh", "c1", "2010-05-15", "0912345678"),
        seed_student("u3", "Cuong Le", "hs.cuong", "c1", "2010-08-20", "0987654321"),
        seed_student("u4", "Minh Pham", "hs.minh", "c2", "2010-02-10", "0909090909"),
    ];

    let credentials = match password.filter(|pw| !pw.is_empty()) {
        Some(pw) => users
            .iter()
            .map(|u| (u.id().to_string(), Credential::new(pw)))
            .collect(),
        None => HashMap::new(),
    };

    let class = |id: &str, name: &str, count: u32, homeroom: &str, code: &str| Class {
        id: id.into(),
        name: name.into(),
        teacher_id: "u1".into(),
        student_count: count,
        school_year: Some("2023-2024".into()),
        homeroom_teacher: Some(homeroom.into()),
        join_code: Some(code.into()),
    };

    let topic = |id: &str, title: &str, order: u32| Topic {
        id: id.into(),
        subject_id: "s1".into(),
        title: title.into(),
        order,
    };

    let question = |id: &str,
                    difficulty: Difficulty,
                    content: &str,
                    explanation: &str,
                    kind: QuestionKind| Question {
        id: id.into(),
        subject_id: Some("s1".into()),
        topic_id: Some("t1".into()),
        difficulty,
        content: content.into(),
        explanation: Some(explanation.into()),
        kind,
    };
    let shutdown: Vec<String> = ["Click Start", "Choose Power", "Choose Shut down"]
        .map(String::from)
        .to_vec();

    Database {
        users,
        credentials,
        classes: vec![
            class("c1", "7A1", 2, "An Nguyen", "ABC1234"),
            class("c2", "7A2", 1, "Lan Tran", "XYZ9876"),
        ],
        subjects: vec![Subject {
            id: "s1".into(),
            name: "Computing 7".into(),
            description: Some("Grade 7 computer science".into()),
        }],
        topics: vec![
            topic("t1", "Topic 1: Computers and society", 1),
            topic("t2", "Topic 2: Storing, finding and sharing information", 2),
            topic("t3", "Topic 4: Applications", 3),
        ],
        lessons: vec![
            seed_lesson(
                "l1",
                "t1",
                "Lesson 1: Input and output devices",
                1,
                LessonStatus::Published,
                "The basic input and output devices of a computer.",
            ),
            seed_lesson(
                "l2",
                "t1",
                "Lesson 2: Computer software",
                2,
                LessonStatus::Published,
                "System software and application software.",
            ),
            seed_lesson(
                "l3",
                "t2",
                "Lesson 4: Social networks",
                1,
                LessonStatus::Draft,
                "Social networks, messaging and online etiquette.",
            ),
            seed_lesson(
                "l4",
                "t3",
                "Lesson 7: Spreadsheets",
                1,
                LessonStatus::Published,
                "Getting started with a spreadsheet and entering data.",
            ),
        ],
        assignments: vec![
            Assignment {
                id: "a1".into(),
                lesson_id: Some("l1".into()),
                title: "Input and output devices".into(),
                description: "List five input devices and five output devices.".into(),
                due_date: date("2023-12-31"),
                max_score: 10.0,
                kind: AssignmentType::Essay,
                rubric: Some("One point per correct device".into()),
            },
            Assignment {
                id: "a2".into(),
                lesson_id: Some("l4".into()),
                title: "Build a grade sheet".into(),
                description: "Make a spreadsheet of your class's grades using AVERAGE.".into(),
                due_date: date("2023-12-31"),
                max_score: 10.0,
                kind: AssignmentType::File,
                rubric: Some("Layout 2, formulas 5, complete data 3".into()),
            },
        ],
        submissions: vec![Submission {
            id: "sub1".into(),
            assignment_id: "a1".into(),
            student_id: "u2".into(),
            student_name: Some("Binh Tran".into()),
            content: "Input: mouse, keyboard, microphone. Output: monitor, speakers.".into(),
            submitted_at: date("2023-10-10"),
            grade: Some(9.0),
            feedback: Some("Well done".into()),
        }],
        announcements: vec![
            Announcement {
                id: "ann1".into(),
                class_id: "c1".into(),
                teacher_id: "u1".into(),
                title: "Short quiz schedule".into(),
                content: "Review lessons 1 and 2 for Thursday's quiz.".into(),
                target: Audience::Student,
                created_at: date("2023-10-01"),
            },
            Announcement {
                id: "ann2".into(),
                class_id: "c1".into(),
                teacher_id: "u1".into(),
                title: "Start-of-year parent meeting".into(),
                content: "Parents are invited to the meeting at 8am on Sunday.".into(),
                target: Audience::Parent,
                created_at: date("2023-09-15"),
            },
        ],
        progress: vec![Progress {
            student_id: "u2".into(),
            lesson_id: "l1".into(),
            completed: true,
            last_access: date("2023-10-01"),
        }],
        questions: vec![
            question(
                "q1",
                Difficulty::Easy,
                "Which of these is an input device?",
                "A keyboard enters data into the computer.",
                QuestionKind::MultipleChoice {
                    options: ["Monitor", "Printer", "Keyboard", "Speaker"]
                        .map(String::from)
                        .to_vec(),
                    correct_answer: "Keyboard".into(),
                },
            ),
            question(
                "q2",
                Difficulty::Medium,
                "What does CPU stand for?",
                "The central processor.",
                QuestionKind::ShortAnswer {
                    correct_answer: "Central Processing Unit".into(),
                },
            ),
            question(
                "q3",
                Difficulty::Medium,
                "A scanner is an ___ device",
                "A scanner brings images into the computer.",
                QuestionKind::FillInTheBlank {
                    correct_answer: "input".into(),
                },
            ),
            question(
                "q4",
                Difficulty::Hard,
                "Put the steps for shutting down a computer in order:",
                "The standard procedure on Windows.",
                QuestionKind::Ordering {
                    options: shutdown.clone(),
                    correct_answer: shutdown,
                },
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursedesk_core::reporting::{on_time_rate, ClassSnapshot};
    use coursedesk_core::session::Session;

    fn fixed_clock(
        at: &str,
    ) -> (Arc<Mutex<DateTime<Utc>>>, impl Fn() -> DateTime<Utc> + Send + Sync) {
        let cell = Arc::new(Mutex::new(date(at)));
        let reader = cell.clone();
        (cell, move || *reader.lock().unwrap())
    }

    fn demo() -> MemoryProvider {
        MemoryProvider::seeded(Some("s3cret"))
    }

    #[tokio::test]
    async fn snapshot_of_unknown_class_is_not_found() {
        let provider = demo();
        let err = ClassSnapshot::fetch(&provider, "c9").await.err().unwrap();
        assert!(matches!(err, DataError::NotFound { entity: "class", .. }));

        let empty = provider
            .create_class(NewClass {
                name: "10A3".into(),
                teacher_id: "u1".into(),
                school_year: None,
                homeroom_teacher: None,
                join_code: None,
            })
            .await
            .unwrap();
        let snapshot = ClassSnapshot::fetch(&provider, &empty.id).await.unwrap();
        assert!(snapshot.students.is_empty());
        assert!(snapshot.submissions.is_empty());
    }

    #[tokio::test]
    async fn login_checks_the_stored_digest() {
        let provider = demo();
        let user = provider.login("gv.an", "s3cret").await.unwrap();
        assert!(matches!(user, User::Teacher(_)));

        assert!(matches!(
            provider.login("gv.an", "123").await,
            Err(DataError::InvalidCredentials)
        ));
        assert!(matches!(
            provider.login("nobody", "s3cret").await,
            Err(DataError::InvalidCredentials)
        ));

        let no_passwords = MemoryProvider::seeded(None);
        assert!(no_passwords.login("gv.an", "").await.is_err());
    }

    #[tokio::test]
    async fn student_mutations_maintain_class_counts() {
        let provider = demo();
        let created = provider
            .create_student(NewStudent {
                name: "Dung Vo".into(),
                username: "hs.dung".into(),
                password: Some("pw".into()),
                class_id: Some("c1".into()),
                ..NewStudent::default()
            })
            .await
            .unwrap();
        let count = |classes: Vec<Class>, id: &str| {
            classes.into_iter().find(|c| c.id == id).unwrap().student_count
        };
        let classes = provider.list_classes(&ListFilter::all()).await.unwrap();
        assert_eq!(count(classes, "c1"), 3);

        let mut moved = created.clone();
        moved.class_id = Some("c2".into());
        provider.update_student(moved, None).await.unwrap();
        let classes = provider.list_classes(&ListFilter::all()).await.unwrap();
        assert_eq!(count(classes.clone(), "c1"), 2);
        assert_eq!(count(classes, "c2"), 2);

        // Password survives an update without a new one.
        assert!(provider.login("hs.dung", "pw").await.is_ok());

        provider.delete_student(&created.id).await.unwrap();
        let classes = provider.list_classes(&ListFilter::all()).await.unwrap();
        assert_eq!(count(classes, "c2"), 1);
        assert!(provider.login("hs.dung", "pw").await.is_err());
    }

    #[tokio::test]
    async fn failed_mutation_leaves_state_unchanged() {
        let provider = demo();
        let err = provider
            .create_student(NewStudent {
                name: "Ghost".into(),
                username: "hs.ghost".into(),
                class_id: Some("missing".into()),
                ..NewStudent::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound { entity: "class", .. }));
        let students = provider.list_students(&ListFilter::all()).await.unwrap();
        assert_eq!(students.len(), 3);
    }

    #[tokio::test]
    async fn resubmission_overwrites_and_refreshes_timestamp() {
        let (now, clock) = fixed_clock("2023-12-20");
        let provider = demo().with_clock(clock);
        let first = provider
            .submit_assignment(NewSubmission {
                assignment_id: "a2".into(),
                student_id: "u3".into(),
                student_name: None,
                content: "draft".into(),
            })
            .await
            .unwrap();

        *now.lock().unwrap() = date("2024-01-05");
        let second = provider
            .submit_assignment(NewSubmission {
                assignment_id: "a2".into(),
                student_id: "u3".into(),
                student_name: None,
                content: "final".into(),
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.submitted_at, date("2024-01-05"));
        let mine = provider
            .list_submissions(&ListFilter::all().assignment("a2").student("u3"))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].content, "final");

        let students = provider.list_students(&ListFilter::all().student("u3")).await.unwrap();
        let assignments = provider
            .list_assignments(&ListFilter::all().assignment("a2"))
            .await
            .unwrap();
        assert_eq!(on_time_rate(&students, &assignments, &mine), 0);
    }

    #[tokio::test]
    async fn grading_is_bounded_by_max_score() {
        let provider = demo();
        let err = provider.grade_submission("sub1", 11.0, "too generous").await.unwrap_err();
        assert!(matches!(
            err,
            DataError::ValidationFailed(ValidationError::GradeOutOfRange { .. })
        ));
        let graded = provider.grade_submission("sub1", 7.5, "ok").await.unwrap();
        assert_eq!(graded.grade, Some(7.5));
        assert!(matches!(
            provider.grade_submission("nope", 1.0, "").await,
            Err(DataError::NotFound { entity: "submission", .. })
        ));
    }

    #[tokio::test]
    async fn mark_complete_is_idempotent() {
        let provider = demo();
        provider.mark_lesson_complete("u3", "l2").await.unwrap();
        provider.mark_lesson_complete("u3", "l2").await.unwrap();
        let progress = provider.list_progress(&ListFilter::all().student("u3")).await.unwrap();
        assert_eq!(progress.len(), 1);
        assert!(progress[0].completed);
    }

    #[tokio::test]
    async fn progress_requires_a_known_student() {
        let provider = demo();
        assert!(matches!(
            provider.mark_lesson_complete("ghost", "l2").await,
            Err(DataError::NotFound { entity: "student", .. })
        ));
        assert!(matches!(
            provider.mark_lesson_complete("u3", "l99").await,
            Err(DataError::NotFound { entity: "lesson", .. })
        ));
        assert!(provider
            .list_progress(&ListFilter::all().student("ghost"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn updates_cannot_orphan_curriculum() {
        let provider = demo();

        let mut topic = provider.list_topics(&ListFilter::all()).await.unwrap().remove(0);
        topic.subject_id = "no-such-subject".into();
        assert!(matches!(
            provider.update_topic(topic).await,
            Err(DataError::NotFound { entity: "subject", .. })
        ));

        let mut lesson = provider.list_lessons(&ListFilter::all()).await.unwrap().remove(0);
        lesson.topic_id = "no-such-topic".into();
        assert!(matches!(
            provider.update_lesson(lesson.clone()).await,
            Err(DataError::NotFound { entity: "topic", .. })
        ));

        lesson.topic_id = "t2".into();
        let moved = provider.update_lesson(lesson).await.unwrap();
        assert_eq!(moved.topic_id, "t2");
        let topics = provider.list_topics(&ListFilter::all()).await.unwrap();
        assert!(topics.iter().all(|t| t.subject_id == "s1"));
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let provider = demo();
        let err = provider
            .create_student(NewStudent {
                name: "Another Binh".into(),
                username: "hs.binh".into(),
                password: Some("other".into()),
                ..NewStudent::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::ValidationFailed(ValidationError::DuplicateUsername(ref name))
                if name == "hs.binh"
        ));
        assert!(provider.login("hs.binh", "other").await.is_err());
        assert!(provider.login("hs.binh", "s3cret").await.is_ok());

        let mut cuong = provider
            .list_students(&ListFilter::all().student("u3"))
            .await
            .unwrap()
            .remove(0);
        cuong.username = "gv.an".into();
        assert!(matches!(
            provider.update_student(cuong.clone(), None).await,
            Err(DataError::ValidationFailed(ValidationError::DuplicateUsername(_)))
        ));

        // Keeping one's own username is fine.
        cuong.username = "hs.cuong".into();
        cuong.name = "Cuong Le Van".into();
        assert_eq!(provider.update_student(cuong, None).await.unwrap().name, "Cuong Le Van");
    }

    #[tokio::test]
    async fn lists_are_ordered() {
        let (_, clock) = fixed_clock("2024-02-01");
        let provider = demo().with_clock(clock);
        provider
            .create_topic(NewTopic {
                subject_id: "s1".into(),
                title: "Topic 0: Warm-up".into(),
                order: 0,
            })
            .await
            .unwrap();
        let topics = provider.list_topics(&ListFilter::all().subject("s1")).await.unwrap();
        assert_eq!(topics[0].title, "Topic 0: Warm-up");
        assert_eq!(topics.last().unwrap().id, "t3");

        provider
            .create_announcement(NewAnnouncement {
                class_id: "c1".into(),
                teacher_id: "u1".into(),
                title: "New".into(),
                content: "Newest".into(),
                target: Audience::All,
            })
            .await
            .unwrap();
        let anns = provider.list_announcements(&ListFilter::all().class("c1")).await.unwrap();
        let ids: Vec<&str> = anns.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids[1..], ["ann1", "ann2"]);
        assert_eq!(anns[0].title, "New");
    }

    #[tokio::test]
    async fn deletes_cascade() {
        let provider = demo();
        provider.delete_assignment("a1").await.unwrap();
        assert!(provider.list_submissions(&ListFilter::all()).await.unwrap().is_empty());

        provider.delete_topic("t1").await.unwrap();
        let lessons = provider.list_lessons(&ListFilter::all()).await.unwrap();
        assert!(lessons.iter().all(|l| l.topic_id != "t1"));
        assert!(provider.list_progress(&ListFilter::all()).await.unwrap().is_empty());

        provider.delete_class("c2").await.unwrap();
        let minh = provider.list_students(&ListFilter::all().student("u4")).await.unwrap();
        assert_eq!(minh[0].class_id, None);

        assert!(matches!(
            provider.delete_class("c2").await,
            Err(DataError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_class_keeps_student_count() {
        let provider = demo();
        let mut class = provider
            .list_classes(&ListFilter::all().class("c1"))
            .await
            .unwrap()
            .remove(0);
        class.student_count = 99;
        class.name = "7A1 (renamed)".into();
        let updated = provider.update_class(class).await.unwrap();
        assert_eq!(updated.student_count, 2);
    }

    #[tokio::test]
    async fn invalid_questions_never_reach_the_store() {
        let provider = demo();
        let err = provider
            .create_question(NewQuestion {
                subject_id: Some("s1".into()),
                topic_id: None,
                difficulty: Difficulty::Easy,
                content: "Pick".into(),
                explanation: None,
                kind: QuestionKind::MultipleChoice {
                    options: vec!["A".into(), "B".into()],
                    correct_answer: "C".into(),
                },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::ValidationFailed(_)));
        let questions = provider.list_questions(&ListFilter::all()).await.unwrap();
        assert_eq!(questions.len(), 4);
        let by_topic = provider
            .list_questions(&ListFilter::all().subject("s1").topic("t1"))
            .await
            .unwrap();
        assert_eq!(by_topic.len(), 4);
    }

    #[tokio::test]
    async fn data_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let provider = MemoryProvider::open(&path, true, Some("pw")).unwrap();
            provider.mark_lesson_complete("u3", "l1").await.unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("\"pw\""));

        let reopened = MemoryProvider::open(&path, true, None).unwrap();
        let progress = reopened.list_progress(&ListFilter::all()).await.unwrap();
        assert_eq!(progress.len(), 2);
        assert!(reopened.login("hs.cuong", "pw").await.is_ok());
    }

    #[test]
    fn seeding_a_data_file_needs_a_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        for password in [None, Some("")] {
            let err = MemoryProvider::open(&path, true, password).err().unwrap();
            assert!(matches!(
                err,
                DataError::ValidationFailed(ValidationError::MissingField("seed_password"))
            ));
            assert!(!path.exists());
        }

        // An empty store needs no seed password.
        MemoryProvider::open(&path, false, None).unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn session_tracks_login_and_role() {
        let session = Session::new(Arc::new(demo()));
        assert!(matches!(session.require_teacher().await, Err(DataError::NotLoggedIn)));

        session.login("hs.binh", "s3cret").await.unwrap();
        assert_eq!(session.require_student().await.unwrap().id, "u2");
        assert!(matches!(
            session.require_teacher().await,
            Err(DataError::WrongRole("teacher"))
        ));

        assert!(session.login("gv.an", "wrong").await.is_err());
        assert_eq!(session.current_user().await.unwrap().id(), "u2");

        session.logout().await;
        assert!(session.current_user().await.is_none());
    }
}
