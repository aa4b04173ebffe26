//! List filters shared by every data provider.
//!
//! A filter field left as `None` does not constrain the result. Providers
//! run their results through [`ListFilter::apply`], so an RPC backend that
//! ignores a filter and the in-memory store return the same set.

use serde::{Deserialize, Serialize};

use crate::model::{
    Announcement, Assignment, Class, Lesson, Progress, Question, Student, Subject, Submission,
    Topic,
};

/// Optional constraints accepted by every list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    /// Only lessons in the `PUBLISHED` state.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub published_only: bool,
}

impl ListFilter {
    /// The unfiltered full set.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn class(mut self, id: impl Into<String>) -> Self {
        self.class_id = Some(id.into());
        self
    }

    pub fn teacher(mut self, id: impl Into<String>) -> Self {
        self.teacher_id = Some(id.into());
        self
    }

    pub fn subject(mut self, id: impl Into<String>) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    pub fn topic(mut self, id: impl Into<String>) -> Self {
        self.topic_id = Some(id.into());
        self
    }

    pub fn assignment(mut self, id: impl Into<String>) -> Self {
        self.assignment_id = Some(id.into());
        self
    }

    pub fn student(mut self, id: impl Into<String>) -> Self {
        self.student_id = Some(id.into());
        self
    }

    pub fn published(mut self) -> Self {
        self.published_only = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Keep only the items this filter matches.
    pub fn apply<T: Filterable>(&self, mut items: Vec<T>) -> Vec<T> {
        items.retain(|item| item.matches(self));
        items
    }
}

/// Does `want` (the filter) accept `have` (the record's value)?
fn accepts(want: &Option<String>, have: Option<&str>) -> bool {
    match want {
        None => true,
        Some(w) => have == Some(w.as_str()),
    }
}

/// A record that knows which [`ListFilter`] fields apply to it.
///
/// Fields that make no sense for a record type (a topic id on a class, say)
/// are ignored rather than excluding everything.
pub trait Filterable {
    fn matches(&self, filter: &ListFilter) -> bool;
}

impl Filterable for Student {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.class_id, self.class_id.as_deref()) && accepts(&f.student_id, Some(&self.id))
    }
}

impl Filterable for Class {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.teacher_id, Some(&self.teacher_id)) && accepts(&f.class_id, Some(&self.id))
    }
}

impl Filterable for Subject {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.subject_id, Some(&self.id))
    }
}

impl Filterable for Topic {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.subject_id, Some(&self.subject_id)) && accepts(&f.topic_id, Some(&self.id))
    }
}

impl Filterable for Lesson {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.topic_id, Some(&self.topic_id)) && (!f.published_only || self.is_published())
    }
}

impl Filterable for Assignment {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.assignment_id, Some(&self.id))
    }
}

impl Filterable for Submission {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.assignment_id, Some(&self.assignment_id))
            && accepts(&f.student_id, Some(&self.student_id))
    }
}

impl Filterable for Progress {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.student_id, Some(&self.student_id))
    }
}

impl Filterable for Announcement {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.class_id, Some(&self.class_id)) && accepts(&f.teacher_id, Some(&self.teacher_id))
    }
}

impl Filterable for Question {
    fn matches(&self, f: &ListFilter) -> bool {
        accepts(&f.subject_id, self.subject_id.as_deref())
            && accepts(&f.topic_id, self.topic_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LessonStatus, QuestionKind};

    fn student(id: &str, class: Option<&str>) -> Student {
        Student {
            id: id.into(),
            name: id.into(),
            email: String::new(),
            username: id.into(),
            avatar: None,
            class_id: class.map(Into::into),
            dob: None,
            parent_phone: None,
        }
    }

    fn lesson(id: &str, topic: &str, status: LessonStatus) -> Lesson {
        Lesson {
            id: id.into(),
            topic_id: topic.into(),
            title: id.into(),
            content: String::new(),
            video_url: None,
            slide_url: None,
            document_url: None,
            status,
            order: 1,
        }
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let students = vec![student("a", Some("c1")), student("b", None)];
        assert!(ListFilter::all().is_empty());
        assert_eq!(ListFilter::all().apply(students).len(), 2);
    }

    #[test]
    fn class_filter_excludes_unassigned_students() {
        let students = vec![
            student("a", Some("c1")),
            student("b", Some("c2")),
            student("c", None),
        ];
        let kept = ListFilter::all().class("c1").apply(students);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }

    #[test]
    fn lessons_by_topic_and_publication() {
        let lessons = vec![
            lesson("l1", "t1", LessonStatus::Published),
            lesson("l2", "t1", LessonStatus::Draft),
            lesson("l3", "t2", LessonStatus::Published),
        ];
        let kept = ListFilter::all().topic("t1").published().apply(lessons.clone());
        assert_eq!(kept.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), ["l1"]);

        let published = ListFilter::all().published().apply(lessons);
        assert_eq!(published.len(), 2);
    }

    #[test]
    fn questions_without_topic_are_excluded_by_topic_filter() {
        let q = Question {
            id: "q1".into(),
            subject_id: Some("s1".into()),
            topic_id: None,
            difficulty: Default::default(),
            content: "?".into(),
            explanation: None,
            kind: QuestionKind::ShortAnswer {
                correct_answer: "x".into(),
            },
        };
        assert!(q.matches(&ListFilter::all().subject("s1")));
        assert!(!q.matches(&ListFilter::all().subject("s1").topic("t1")));
    }

    #[test]
    fn filter_serializes_only_set_fields() {
        let json = serde_json::to_value(ListFilter::all().class("c1")).unwrap();
        assert_eq!(json, serde_json::json!({"classId": "c1"}));
    }
}
