//! Class health metrics: completion, on-time submission and at-risk students.
//!
//! Everything here is a pure function of a snapshot of records; "now" is
//! always passed in. [`ClassSnapshot::fetch`] is the one place that talks to a
//! [`DataProvider`].

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use crate::filter::ListFilter;
use crate::model::{Assignment, Lesson, Progress, Student, Submission};
use crate::traits::DataProvider;

/// Students with more late-or-missing work than this are at risk.
pub const DEFAULT_MAX_LATE: u32 = 2;

/// Students whose graded average falls below this are at risk.
pub const DEFAULT_MIN_AVERAGE: f64 = 5.0;

/// Thresholds for [`at_risk_students`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub max_late: u32,
    pub min_average: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            max_late: DEFAULT_MAX_LATE,
            min_average: DEFAULT_MIN_AVERAGE,
        }
    }
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * part as f64 / whole as f64).round() as u32
}

/// Share of (student, published lesson) pairs completed, as a rounded percent.
///
/// Progress on lessons outside `published_lessons` is ignored.
pub fn completion_rate(
    students: &[Student],
    published_lessons: &[Lesson],
    progress: &[Progress],
) -> u32 {
    let expected = students.len() * published_lessons.len();
    if expected == 0 {
        return 0;
    }

    let students: HashSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
    let lessons: HashSet<&str> = published_lessons.iter().map(|l| l.id.as_str()).collect();
    let completed: HashSet<(&str, &str)> = progress
        .iter()
        .filter(|p| p.completed)
        .filter(|p| {
            students.contains(p.student_id.as_str()) && lessons.contains(p.lesson_id.as_str())
        })
        .map(|p| (p.student_id.as_str(), p.lesson_id.as_str()))
        .collect();

    percent(completed.len(), expected)
}

/// Index submissions by (assignment, student).
fn by_pair(submissions: &[Submission]) -> HashMap<(&str, &str), &Submission> {
    submissions
        .iter()
        .map(|s| ((s.assignment_id.as_str(), s.student_id.as_str()), s))
        .collect()
}

/// Share of submitted (student, assignment) pairs handed in by the due date.
///
/// Missing submissions are not part of the denominator. Returns 0 when
/// nothing was submitted.
pub fn on_time_rate(
    students: &[Student],
    assignments: &[Assignment],
    submissions: &[Submission],
) -> u32 {
    let index = by_pair(submissions);
    let mut on_time = 0;
    let mut late = 0;

    for student in students {
        for assignment in assignments {
            match index.get(&(assignment.id.as_str(), student.id.as_str())) {
                Some(sub) if assignment.is_late(sub.submitted_at) => late += 1,
                Some(_) => on_time += 1,
                None => {}
            }
        }
    }

    percent(on_time, on_time + late)
}

/// Why a student was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskReason {
    FrequentlyLate,
    LowAverage,
}

impl std::fmt::Display for RiskReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskReason::FrequentlyLate => write!(f, "frequently late"),
            RiskReason::LowAverage => write!(f, "low average"),
        }
    }
}

/// A flagged student and the numbers behind the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRiskStudent {
    pub student_id: String,
    pub name: String,
    /// Late submissions plus past-due assignments never submitted.
    pub late_count: u32,
    pub graded_count: u32,
    /// Mean of graded submissions; 0 when nothing is graded.
    pub average: f64,
    pub reasons: Vec<RiskReason>,
}

/// Students meeting either risk condition of `policy`, in input order.
pub fn at_risk_students(
    students: &[Student],
    assignments: &[Assignment],
    submissions: &[Submission],
    now: DateTime<Utc>,
    policy: &RiskPolicy,
) -> Vec<AtRiskStudent> {
    let index = by_pair(submissions);
    let mut flagged = Vec::new();

    for student in students {
        let mut late_count = 0u32;
        let mut graded = Vec::new();

        for assignment in assignments {
            match index.get(&(assignment.id.as_str(), student.id.as_str())) {
                Some(sub) => {
                    if assignment.is_late(sub.submitted_at) {
                        late_count += 1;
                    }
                    if let Some(grade) = sub.grade {
                        graded.push(grade);
                    }
                }
                None if assignment.due_date < now => late_count += 1,
                None => {}
            }
        }

        let average = mean(&graded).unwrap_or(0.0);
        let mut reasons = Vec::new();
        if late_count > policy.max_late {
            reasons.push(RiskReason::FrequentlyLate);
        }
        if !graded.is_empty() && average < policy.min_average {
            reasons.push(RiskReason::LowAverage);
        }

        if !reasons.is_empty() {
            flagged.push(AtRiskStudent {
                student_id: student.id.clone(),
                name: student.name.clone(),
                late_count,
                graded_count: graded.len() as u32,
                average,
                reasons,
            });
        }
    }

    flagged
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean grade over a student's graded submissions; `None` when none are
/// graded.
pub fn class_average(student_id: &str, submissions: &[Submission]) -> Option<f64> {
    let grades: Vec<f64> = submissions
        .iter()
        .filter(|s| s.student_id == student_id)
        .filter_map(|s| s.grade)
        .collect();
    mean(&grades)
}

/// Assignments due within `[now, now + days]`.
pub fn assignments_due_soon(assignments: &[Assignment], now: DateTime<Utc>, days: i64) -> usize {
    let horizon = now + Duration::days(days);
    assignments
        .iter()
        .filter(|a| a.due_date >= now && a.due_date <= horizon)
        .count()
}

/// The records a class report is computed from.
#[derive(Debug, Clone, Default)]
pub struct ClassSnapshot {
    pub class_id: String,
    pub students: Vec<Student>,
    pub assignments: Vec<Assignment>,
    pub submissions: Vec<Submission>,
    pub progress: Vec<Progress>,
    pub published_lessons: Vec<Lesson>,
}

impl ClassSnapshot {
    /// Load everything a report on `class_id` needs, issuing the list calls
    /// concurrently. Submissions and progress are narrowed to the class's
    /// students. An unknown class is `NotFound`; a known empty class is not
    /// an error.
    pub async fn fetch(provider: &dyn DataProvider, class_id: &str) -> DataResult<Self> {
        let in_class = ListFilter::all().class(class_id);
        let everything = ListFilter::all();
        let published = ListFilter::all().published();

        let (classes, students, assignments, submissions, progress, published_lessons) =
            futures::try_join!(
                provider.list_classes(&in_class),
                provider.list_students(&in_class),
                provider.list_assignments(&everything),
                provider.list_submissions(&everything),
                provider.list_progress(&everything),
                provider.list_lessons(&published),
            )?;
        if classes.is_empty() {
            return Err(DataError::not_found("class", class_id));
        }

        let ids: HashSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
        let submissions = submissions
            .into_iter()
            .filter(|s| ids.contains(s.student_id.as_str()))
            .collect();
        let progress = progress
            .into_iter()
            .filter(|p| ids.contains(p.student_id.as_str()))
            .collect();

        tracing::debug!(
            class_id,
            students = students.len(),
            assignments = assignments.len(),
            "loaded class snapshot"
        );

        Ok(Self {
            class_id: class_id.to_string(),
            students,
            assignments,
            submissions,
            progress,
            published_lessons,
        })
    }
}

/// Headline numbers for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassHealth {
    pub class_id: String,
    pub student_count: usize,
    pub completion_rate: u32,
    pub on_time_rate: u32,
    pub due_this_week: usize,
    pub at_risk: Vec<AtRiskStudent>,
}

impl ClassHealth {
    pub fn compute(snapshot: &ClassSnapshot, now: DateTime<Utc>, policy: &RiskPolicy) -> Self {
        Self {
            class_id: snapshot.class_id.clone(),
            student_count: snapshot.students.len(),
            completion_rate: completion_rate(
                &snapshot.students,
                &snapshot.published_lessons,
                &snapshot.progress,
            ),
            on_time_rate: on_time_rate(
                &snapshot.students,
                &snapshot.assignments,
                &snapshot.submissions,
            ),
            due_this_week: assignments_due_soon(&snapshot.assignments, now, 7),
            at_risk: at_risk_students(
                &snapshot.students,
                &snapshot.assignments,
                &snapshot.submissions,
                now,
                policy,
            ),
        }
    }

    /// Render as a Markdown section.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Class report: {}\n", self.class_id);
        let _ = writeln!(md, "| Metric | Value |");
        let _ = writeln!(md, "|--------|-------|");
        let _ = writeln!(md, "| Students | {} |", self.student_count);
        let _ = writeln!(md, "| Lesson completion | {}% |", self.completion_rate);
        let _ = writeln!(md, "| On-time submissions | {}% |", self.on_time_rate);
        let _ = writeln!(md, "| Due in the next 7 days | {} |", self.due_this_week);
        md.push('\n');

        if self.at_risk.is_empty() {
            md.push_str("No students at risk.\n");
            return md;
        }

        let _ = writeln!(md, "## At-risk students\n");
        let _ = writeln!(md, "| Student | Late/missing | Average | Reasons |");
        let _ = writeln!(md, "|---------|--------------|---------|---------|");
        for s in &self.at_risk {
            let average = if s.graded_count == 0 {
                "-".to_string()
            } else {
                format!("{:.1}", s.average)
            };
            let reasons: Vec<String> = s.reasons.iter().map(ToString::to_string).collect();
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} |",
                s.name,
                s.late_count,
                average,
                reasons.join(", ")
            );
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_timestamp, AssignmentType, LessonStatus};

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn student(id: &str) -> Student {
        Student {
            id: id.into(),
            name: format!("Student {id}"),
            email: String::new(),
            username: id.into(),
            avatar: None,
            class_id: Some("c1".into()),
            dob: None,
            parent_phone: None,
        }
    }

    fn assignment(id: &str, due: &str) -> Assignment {
        Assignment {
            id: id.into(),
            lesson_id: None,
            title: id.into(),
            description: String::new(),
            due_date: ts(due),
            max_score: 10.0,
            kind: AssignmentType::Essay,
            rubric: None,
        }
    }

    fn submission(assignment: &str, student: &str, at: &str, grade: Option<f64>) -> Submission {
        Submission {
            id: format!("{assignment}-{student}"),
            assignment_id: assignment.into(),
            student_id: student.into(),
            student_name: None,
            content: "done".into(),
            submitted_at: ts(at),
            grade,
            feedback: None,
        }
    }

    fn lesson(id: &str) -> Lesson {
        Lesson {
            id: id.into(),
            topic_id: "t1".into(),
            title: id.into(),
            content: String::new(),
            video_url: None,
            slide_url: None,
            document_url: None,
            status: LessonStatus::Published,
            order: 1,
        }
    }

    fn done(student: &str, lesson: &str) -> Progress {
        Progress {
            student_id: student.into(),
            lesson_id: lesson.into(),
            completed: true,
            last_access: ts("2024-01-01"),
        }
    }

    #[test]
    fn completion_is_zero_without_students_or_lessons() {
        assert_eq!(completion_rate(&[], &[lesson("l1")], &[]), 0);
        assert_eq!(completion_rate(&[student("u2")], &[], &[done("u2", "l1")]), 0);
    }

    #[test]
    fn completion_is_full_when_everything_is_done() {
        let students = [student("u2"), student("u3")];
        let lessons = [lesson("l1"), lesson("l2")];
        let progress: Vec<Progress> = ["u2", "u3"]
            .iter()
            .flat_map(|s| ["l1", "l2"].map(|l| done(s, l)))
            .collect();
        assert_eq!(completion_rate(&students, &lessons, &progress), 100);
    }

    #[test]
    fn completion_ignores_unpublished_and_incomplete_progress() {
        let students = [student("u2")];
        let lessons = [lesson("l1"), lesson("l2"), lesson("l3")];
        let mut unfinished = done("u2", "l2");
        unfinished.completed = false;
        let progress = [done("u2", "l1"), unfinished, done("u2", "draft-lesson")];
        assert_eq!(completion_rate(&students, &lessons, &progress), 33);
    }

    #[test]
    fn on_time_rate_without_submissions_is_zero() {
        let assignments = [assignment("a1", "2023-12-31")];
        assert_eq!(on_time_rate(&[student("u2")], &assignments, &[]), 0);
    }

    #[test]
    fn on_time_rate_rises_as_late_work_becomes_on_time() {
        let students = [student("u2"), student("u3")];
        let assignments = [assignment("a1", "2023-12-31")];
        let both_late = [
            submission("a1", "u2", "2024-01-02", None),
            submission("a1", "u3", "2024-01-02", None),
        ];
        let one_late = [
            submission("a1", "u2", "2023-12-30", None),
            submission("a1", "u3", "2024-01-02", None),
        ];
        let none_late = [
            submission("a1", "u2", "2023-12-30", None),
            submission("a1", "u3", "2023-12-30", None),
        ];
        assert_eq!(on_time_rate(&students, &assignments, &both_late), 0);
        assert_eq!(on_time_rate(&students, &assignments, &one_late), 50);
        assert_eq!(on_time_rate(&students, &assignments, &none_late), 100);
    }

    #[test]
    fn resubmission_after_deadline_turns_late() {
        let students = [student("u2")];
        let assignments = [assignment("a1", "2023-12-31")];
        let mut record = submission("a1", "u2", "2023-12-20", None);
        assert_eq!(on_time_rate(&students, &assignments, std::slice::from_ref(&record)), 100);

        record.submitted_at = ts("2024-01-05");
        assert_eq!(on_time_rate(&students, &assignments, std::slice::from_ref(&record)), 0);
    }

    #[test]
    fn three_missing_past_due_is_at_risk() {
        let students = [student("u2")];
        let assignments = [
            assignment("a1", "2023-10-01"),
            assignment("a2", "2023-11-01"),
            assignment("a3", "2023-12-01"),
        ];
        let flagged = at_risk_students(
            &students,
            &assignments,
            &[],
            ts("2024-01-01"),
            &RiskPolicy::default(),
        );
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].late_count, 3);
        assert_eq!(flagged[0].reasons, vec![RiskReason::FrequentlyLate]);
    }

    #[test]
    fn two_late_with_passing_average_is_not_at_risk() {
        let students = [student("u2")];
        let assignments = [assignment("a1", "2023-10-01"), assignment("a2", "2023-11-01")];
        let submissions = [
            submission("a1", "u2", "2023-10-05", Some(6.0)),
            submission("a2", "u2", "2023-11-05", Some(6.0)),
        ];
        let flagged = at_risk_students(
            &students,
            &assignments,
            &submissions,
            ts("2024-01-01"),
            &RiskPolicy::default(),
        );
        assert!(flagged.is_empty());
    }

    #[test]
    fn low_average_flags_and_future_work_is_not_missing() {
        let students = [student("u2"), student("u3")];
        let assignments = [assignment("a1", "2023-10-01"), assignment("a2", "2030-01-01")];
        let submissions = [submission("a1", "u2", "2023-09-30", Some(3.5))];
        let flagged = at_risk_students(
            &students,
            &assignments,
            &submissions,
            ts("2024-01-01"),
            &RiskPolicy::default(),
        );
        // u3 has only one past-due miss and nothing graded.
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].student_id, "u2");
        assert_eq!(flagged[0].reasons, vec![RiskReason::LowAverage]);
        assert_eq!(flagged[0].late_count, 0);
    }

    #[test]
    fn average_of_exactly_the_threshold_is_not_low() {
        let students = [student("u2"), student("u3")];
        let assignments = [assignment("a1", "2023-10-01"), assignment("a2", "2023-11-01")];
        let submissions = [
            submission("a1", "u2", "2023-09-30", Some(4.0)),
            submission("a2", "u2", "2023-10-30", Some(6.0)),
            submission("a1", "u3", "2023-09-30", Some(4.9)),
            submission("a2", "u3", "2023-10-30", Some(4.9)),
        ];
        let flagged = at_risk_students(
            &students,
            &assignments,
            &submissions,
            ts("2024-01-01"),
            &RiskPolicy::default(),
        );
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].student_id, "u3");
        assert_eq!(flagged[0].reasons, vec![RiskReason::LowAverage]);
    }

    #[test]
    fn policy_thresholds_are_configurable() {
        let students = [student("u2")];
        let assignments = [assignment("a1", "2023-10-01")];
        let strict = RiskPolicy {
            max_late: 0,
            min_average: 9.0,
        };
        let submissions = [submission("a1", "u2", "2023-10-02", Some(8.0))];
        let flagged = at_risk_students(
            &students,
            &assignments,
            &submissions,
            ts("2024-01-01"),
            &strict,
        );
        assert_eq!(
            flagged[0].reasons,
            vec![RiskReason::FrequentlyLate, RiskReason::LowAverage]
        );
    }

    #[test]
    fn class_average_distinguishes_no_data_from_zero() {
        let submissions = [
            submission("a1", "u2", "2023-10-01", Some(0.0)),
            submission("a2", "u2", "2023-10-01", None),
            submission("a1", "u3", "2023-10-01", None),
        ];
        assert_eq!(class_average("u2", &submissions), Some(0.0));
        assert_eq!(class_average("u3", &submissions), None);
        assert_eq!(class_average("nobody", &submissions), None);
    }

    #[test]
    fn due_soon_counts_the_coming_week() {
        let assignments = [
            assignment("past", "2023-12-30"),
            assignment("soon", "2024-01-03"),
            assignment("edge", "2024-01-08"),
            assignment("later", "2024-02-01"),
        ];
        assert_eq!(assignments_due_soon(&assignments, ts("2024-01-01"), 7), 2);
    }

    #[test]
    fn health_markdown_lists_flagged_students() {
        let snapshot = ClassSnapshot {
            class_id: "c1".into(),
            students: vec![student("u2")],
            assignments: vec![
                assignment("a1", "2023-10-01"),
                assignment("a2", "2023-11-01"),
                assignment("a3", "2023-12-01"),
            ],
            ..ClassSnapshot::default()
        };
        let health = ClassHealth::compute(&snapshot, ts("2024-01-01"), &RiskPolicy::default());
        assert_eq!(health.at_risk.len(), 1);
        let md = health.to_markdown();
        assert!(md.contains("# Class report: c1"));
        assert!(md.contains("| Student u2 | 3 | - | frequently late |"));
    }
}
