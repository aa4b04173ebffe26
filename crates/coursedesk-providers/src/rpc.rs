//! HTTP-RPC data provider.
//!
//! Every operation is a `POST` of `{"action": ..., "payload": ...}` to a
//! single endpoint, answered by an `{ok, data, error, code}` envelope. The
//! body is sent as `text/plain` so browser-facing script backends accept it
//! without a CORS preflight.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use coursedesk_core::error::{DataError, DataResult, ValidationError};
use coursedesk_core::filter::{Filterable, ListFilter};
use coursedesk_core::model::{
    sort_by_order, Announcement, Assignment, Class, Lesson, NewAnnouncement, NewAssignment,
    NewClass, NewLesson, NewQuestion, NewStudent, NewSubject, NewSubmission, NewTopic, Progress,
    Question, Student, Subject, Submission, Topic, User,
};
use coursedesk_core::question;
use coursedesk_core::traits::DataProvider;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const CONTENT_TYPE: &str = "text/plain;charset=utf-8";

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    action: &'a str,
    payload: &'a P,
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentUpdate<'a> {
    #[serde(flatten)]
    student: &'a Student,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

/// Singular entity name for an action such as `students.delete`.
fn entity_of(action: &str) -> &'static str {
    match action.split('.').next().unwrap_or_default() {
        "students" => "student",
        "classes" => "class",
        "subjects" => "subject",
        "topics" => "topic",
        "lessons" => "lesson",
        "assignments" => "assignment",
        "submissions" => "submission",
        "progress" => "progress",
        "announcements" => "announcement",
        "questions" => "question",
        _ => "record",
    }
}

/// Map a non-ok envelope onto the error taxonomy.
fn classify(action: &str, target: Option<&str>, code: Option<&str>, message: String) -> DataError {
    if action == "login" {
        return DataError::InvalidCredentials;
    }
    match code {
        Some("NOT_FOUND") => DataError::not_found(entity_of(action), target.unwrap_or(&message)),
        Some("VALIDATION_FAILED") => ValidationError::Backend(message).into(),
        Some("INVALID_CREDENTIALS") => DataError::InvalidCredentials,
        _ => DataError::Rejected {
            action: action.to_string(),
            message,
        },
    }
}

/// Data provider speaking the envelope protocol over HTTP.
pub struct RpcProvider {
    endpoint: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl RpcProvider {
    pub fn new(endpoint: &str, timeout_secs: u64) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DataError::TransportFailure(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            timeout_secs,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<P, T>(&self, action: &str, payload: &P) -> DataResult<T>
    where
        P: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        self.call_on(action, None, payload).await
    }

    /// Issue one action. `target` is the id the action is about, used to
    /// label a `NOT_FOUND` answer.
    #[instrument(skip(self, payload), fields(endpoint = %self.endpoint))]
    async fn call_on<P, T>(&self, action: &str, target: Option<&str>, payload: &P) -> DataResult<T>
    where
        P: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let body = serde_json::to_string(&RpcRequest { action, payload })
            .map_err(|e| DataError::TransportFailure(format!("failed to encode {action}: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DataError::TransportFailure(format!(
                        "{action} timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    DataError::TransportFailure(format!("{action}: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| {
                DataError::TransportFailure(format!("{action}: failed to read body: {e}"))
            })?;
        if !status.is_success() {
            return Err(DataError::TransportFailure(format!(
                "{action}: HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            DataError::TransportFailure(format!("{action}: malformed response: {e}"))
        })?;

        if !envelope.ok {
            let message = envelope
                .error
                .unwrap_or_else(|| "unknown backend error".to_string());
            tracing::debug!(code = ?envelope.code, %message, "backend rejected call");
            return Err(classify(action, target, envelope.code.as_deref(), message));
        }

        serde_json::from_value(envelope.data.unwrap_or(Value::Null)).map_err(|e| {
            DataError::TransportFailure(format!("{action}: unexpected data shape: {e}"))
        })
    }

    async fn list<T>(&self, action: &str, filter: &ListFilter) -> DataResult<Vec<T>>
    where
        T: DeserializeOwned + Filterable + Send,
    {
        let items: Vec<T> = self.call(action, filter).await?;
        Ok(filter.apply(items))
    }

    async fn delete(&self, action: &str, id: &str) -> DataResult<()> {
        self.call_on(action, Some(id), &json!({ "id": id })).await
    }
}

#[async_trait]
impl DataProvider for RpcProvider {
    fn name(&self) -> &str {
        "rpc"
    }

    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> DataResult<User> {
        self.call("login", &json!({ "username": username, "password": password }))
            .await
    }

    async fn list_students(&self, filter: &ListFilter) -> DataResult<Vec<Student>> {
        self.list("students.list", filter).await
    }

    async fn create_student(&self, student: NewStudent) -> DataResult<Student> {
        self.call("students.create", &student).await
    }

    async fn update_student(
        &self,
        student: Student,
        new_password: Option<String>,
    ) -> DataResult<Student> {
        let payload = StudentUpdate {
            student: &student,
            password: new_password.as_deref(),
        };
        self.call_on("students.update", Some(&student.id), &payload)
            .await
    }

    async fn delete_student(&self, id: &str) -> DataResult<()> {
        self.delete("students.delete", id).await
    }

    async fn list_classes(&self, filter: &ListFilter) -> DataResult<Vec<Class>> {
        self.list("classes.list", filter).await
    }

    async fn create_class(&self, class: NewClass) -> DataResult<Class> {
        self.call("classes.create", &class).await
    }

    async fn update_class(&self, class: Class) -> DataResult<Class> {
        self.call_on("classes.update", Some(&class.id), &class).await
    }

    async fn delete_class(&self, id: &str) -> DataResult<()> {
        self.delete("classes.delete", id).await
    }

    async fn list_subjects(&self, filter: &ListFilter) -> DataResult<Vec<Subject>> {
        self.list("subjects.list", filter).await
    }

    async fn create_subject(&self, subject: NewSubject) -> DataResult<Subject> {
        self.call("subjects.create", &subject).await
    }

    async fn update_subject(&self, subject: Subject) -> DataResult<Subject> {
        self.call_on("subjects.update", Some(&subject.id), &subject)
            .await
    }

    async fn delete_subject(&self, id: &str) -> DataResult<()> {
        self.delete("subjects.delete", id).await
    }

    async fn list_topics(&self, filter: &ListFilter) -> DataResult<Vec<Topic>> {
        let mut topics: Vec<Topic> = self.list("topics.list", filter).await?;
        sort_by_order(&mut topics, |t| t.order);
        Ok(topics)
    }

    async fn create_topic(&self, topic: NewTopic) -> DataResult<Topic> {
        self.call("topics.create", &topic).await
    }

    async fn update_topic(&self, topic: Topic) -> DataResult<Topic> {
        self.call_on("topics.update", Some(&topic.id), &topic).await
    }

    async fn delete_topic(&self, id: &str) -> DataResult<()> {
        self.delete("topics.delete", id).await
    }

    async fn list_lessons(&self, filter: &ListFilter) -> DataResult<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = self.list("lessons.list", filter).await?;
        sort_by_order(&mut lessons, |l| l.order);
        Ok(lessons)
    }

    async fn create_lesson(&self, lesson: NewLesson) -> DataResult<Lesson> {
        self.call("lessons.create", &lesson).await
    }

    async fn update_lesson(&self, lesson: Lesson) -> DataResult<Lesson> {
        self.call_on("lessons.update", Some(&lesson.id), &lesson).await
    }

    async fn delete_lesson(&self, id: &str) -> DataResult<()> {
        self.delete("lessons.delete", id).await
    }

    async fn list_assignments(&self, filter: &ListFilter) -> DataResult<Vec<Assignment>> {
        self.list("assignments.list", filter).await
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> DataResult<Assignment> {
        self.call("assignments.create", &assignment).await
    }

    async fn update_assignment(&self, assignment: Assignment) -> DataResult<Assignment> {
        self.call_on("assignments.update", Some(&assignment.id), &assignment)
            .await
    }

    async fn delete_assignment(&self, id: &str) -> DataResult<()> {
        self.delete("assignments.delete", id).await
    }

    async fn list_submissions(&self, filter: &ListFilter) -> DataResult<Vec<Submission>> {
        self.list("submissions.list", filter).await
    }

    async fn submit_assignment(&self, submission: NewSubmission) -> DataResult<Submission> {
        self.call("submissions.submit", &submission).await
    }

    async fn grade_submission(
        &self,
        submission_id: &str,
        grade: f64,
        feedback: &str,
    ) -> DataResult<Submission> {
        let payload = json!({ "id": submission_id, "grade": grade, "feedback": feedback });
        self.call_on("submissions.grade", Some(submission_id), &payload)
            .await
    }

    async fn list_progress(&self, filter: &ListFilter) -> DataResult<Vec<Progress>> {
        self.list("progress.list", filter).await
    }

    async fn mark_lesson_complete(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> DataResult<Progress> {
        let payload = json!({ "studentId": student_id, "lessonId": lesson_id });
        self.call_on("progress.update", Some(lesson_id), &payload)
            .await
    }

    async fn list_announcements(&self, filter: &ListFilter) -> DataResult<Vec<Announcement>> {
        let mut items: Vec<Announcement> = self.list("announcements.list", filter).await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn create_announcement(&self, announcement: NewAnnouncement) -> DataResult<Announcement> {
        self.call("announcements.create", &announcement).await
    }

    async fn list_questions(&self, filter: &ListFilter) -> DataResult<Vec<Question>> {
        self.list("questions.list", filter).await
    }

    async fn create_question(&self, mut question: NewQuestion) -> DataResult<Question> {
        question::validate_new(&mut question)?;
        self.call("questions.create", &question).await
    }

    async fn update_question(&self, mut question: Question) -> DataResult<Question> {
        question::validate(&mut question)?;
        self.call_on("questions.update", Some(&question.id), &question)
            .await
    }

    async fn delete_question(&self, id: &str) -> DataResult<()> {
        self.delete("questions.delete", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursedesk_core::model::{Difficulty, QuestionKind};
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> RpcProvider {
        RpcProvider::new(&format!("{}/exec", server.uri()), DEFAULT_TIMEOUT_SECS).unwrap()
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "data": data }))
    }

    fn rejected(error: &str, code: Option<&str>) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "ok": false, "error": error, "code": code }))
    }

    #[tokio::test]
    async fn list_sends_action_as_plain_text_and_reapplies_filter() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/exec"))
            .and(header("content-type", CONTENT_TYPE))
            .and(body_json(json!({ "action": "students.list", "payload": { "classId": "c1" } })))
            .respond_with(ok(json!([
                { "id": "u2", "name": "Binh", "username": "hs.binh", "classId": "c1" },
                { "id": "u4", "name": "Minh", "username": "hs.minh", "classId": "c2" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let students = provider(&server)
            .await
            .list_students(&ListFilter::all().class("c1"))
            .await
            .unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "u2");
    }

    #[tokio::test]
    async fn failed_login_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "login" })))
            .respond_with(rejected("Wrong username or password", None))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .login("gv.an", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_returns_role_tagged_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "action": "login",
                "payload": { "username": "gv.an", "password": "pw" }
            })))
            .respond_with(ok(json!({
                "role": "TEACHER", "id": "u1", "name": "An", "username": "gv.an"
            })))
            .mount(&server)
            .await;

        let user = provider(&server).await.login("gv.an", "pw").await.unwrap();
        assert!(matches!(user, User::Teacher(_)));
    }

    #[tokio::test]
    async fn error_codes_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "assignments.delete" })))
            .respond_with(rejected("Assignment not found", Some("NOT_FOUND")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "submissions.grade" })))
            .respond_with(rejected("Grade too high", Some("VALIDATION_FAILED")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "classes.delete" })))
            .respond_with(rejected("Sheet is locked", None))
            .mount(&server)
            .await;

        let rpc = provider(&server).await;

        match rpc.delete_assignment("a9").await.unwrap_err() {
            DataError::NotFound { entity, id } => {
                assert_eq!(entity, "assignment");
                assert_eq!(id, "a9");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }

        assert!(matches!(
            rpc.grade_submission("sub1", 42.0, "").await.unwrap_err(),
            DataError::ValidationFailed(ValidationError::Backend(m)) if m == "Grade too high"
        ));

        match rpc.delete_class("c1").await.unwrap_err() {
            DataError::Rejected { action, message } => {
                assert_eq!(action, "classes.delete");
                assert_eq!(message, "Sheet is locked");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_errors_and_garbage_are_transport_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "classes.list" })))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "action": "subjects.list" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login required</html>"))
            .mount(&server)
            .await;

        let rpc = provider(&server).await;
        let err = rpc.list_classes(&ListFilter::all()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("500"));

        let err = rpc.list_subjects(&ListFilter::all()).await.unwrap_err();
        assert!(matches!(err, DataError::TransportFailure(ref m) if m.contains("malformed")));
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_failure() {
        let rpc = RpcProvider::new("http://127.0.0.1:1/exec", 2).unwrap();
        let err = rpc.list_classes(&ListFilter::all()).await.unwrap_err();
        assert!(matches!(err, DataError::TransportFailure(_)));
    }

    #[tokio::test]
    async fn invalid_question_is_rejected_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok(json!(null)))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .create_question(NewQuestion {
                subject_id: None,
                topic_id: None,
                difficulty: Difficulty::Easy,
                content: String::new(),
                explanation: None,
                kind: QuestionKind::ShortAnswer {
                    correct_answer: "x".into(),
                },
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::ValidationFailed(ValidationError::MissingContent)
        ));
    }

    #[tokio::test]
    async fn ordering_is_normalized_before_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "action": "questions.update",
                "payload": { "correctAnswer": ["Start", "Power"] }
            })))
            .respond_with(ok(json!({
                "id": "q4", "type": "ORDERING", "difficulty": "HARD", "content": "Order",
                "options": ["Start", "Power"], "correctAnswer": ["Start", "Power"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let question = Question {
            id: "q4".into(),
            subject_id: None,
            topic_id: None,
            difficulty: Difficulty::Hard,
            content: "Order".into(),
            explanation: None,
            kind: QuestionKind::Ordering {
                options: vec!["Start".into(), "Power".into()],
                correct_answer: vec!["stale".into()],
            },
        };
        provider(&server)
            .await
            .update_question(question)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_accepts_missing_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "action": "questions.delete", "payload": { "id": "q1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        provider(&server).await.delete_question("q1").await.unwrap();
    }
}
