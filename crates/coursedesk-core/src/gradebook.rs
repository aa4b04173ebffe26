//! Students × assignments grade matrix.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;

use crate::model::{Assignment, Student, Submission};
use crate::reporting::mean;

/// One cell of the gradebook.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", content = "grade", rename_all = "lowercase")]
pub enum GradeCell {
    /// No submission.
    Missing,
    /// Submitted but not graded yet.
    Pending,
    Graded(f64),
}

impl fmt::Display for GradeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeCell::Missing => write!(f, "-"),
            GradeCell::Pending => write!(f, "pending"),
            GradeCell::Graded(g) => write!(f, "{g}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradebookRow {
    pub student_id: String,
    pub student_name: String,
    /// One cell per assignment, in [`Gradebook::assignments`] order.
    pub cells: Vec<GradeCell>,
    /// Mean of the graded cells; `None` when nothing is graded.
    pub average: Option<f64>,
}

impl GradebookRow {
    /// The average as shown in the table: one decimal, or `-`.
    pub fn average_display(&self) -> String {
        match self.average {
            Some(avg) => format!("{avg:.1}"),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradebook {
    /// Column headers: (assignment id, title).
    pub assignments: Vec<(String, String)>,
    pub rows: Vec<GradebookRow>,
}

impl Gradebook {
    pub fn build(
        students: &[Student],
        assignments: &[Assignment],
        submissions: &[Submission],
    ) -> Self {
        let index: HashMap<(&str, &str), &Submission> = submissions
            .iter()
            .map(|s| ((s.student_id.as_str(), s.assignment_id.as_str()), s))
            .collect();

        let rows = students
            .iter()
            .map(|student| {
                let cells: Vec<GradeCell> = assignments
                    .iter()
                    .map(|a| match index.get(&(student.id.as_str(), a.id.as_str())) {
                        None => GradeCell::Missing,
                        Some(sub) => sub.grade.map_or(GradeCell::Pending, GradeCell::Graded),
                    })
                    .collect();
                let graded: Vec<f64> = cells
                    .iter()
                    .filter_map(|c| match c {
                        GradeCell::Graded(g) => Some(*g),
                        _ => None,
                    })
                    .collect();
                GradebookRow {
                    student_id: student.id.clone(),
                    student_name: student.name.clone(),
                    average: mean(&graded),
                    cells,
                }
            })
            .collect();

        Self {
            assignments: assignments
                .iter()
                .map(|a| (a.id.clone(), a.title.clone()))
                .collect(),
            rows,
        }
    }

    /// Render as a Markdown table: a Student column, one column per
    /// assignment, then Average.
    pub fn to_markdown(&self) -> String {
        let mut header = vec!["Student"];
        header.extend(self.assignments.iter().map(|(_, title)| title.as_str()));
        header.push("Average");

        let mut md = String::new();
        let _ = writeln!(md, "| {} |", header.join(" | "));
        let _ = writeln!(md, "|{}", "---|".repeat(header.len()));
        for row in &self.rows {
            let mut cells = vec![row.student_name.clone()];
            cells.extend(row.cells.iter().map(ToString::to_string));
            cells.push(row.average_display());
            let _ = writeln!(md, "| {} |", cells.join(" | "));
        }
        md
    }
}
