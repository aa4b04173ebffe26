//! The `coursedesk report` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use comfy_table::{Cell, Table};

use coursedesk_core::filter::ListFilter;
use coursedesk_core::model::parse_timestamp;
use coursedesk_core::reporting::{ClassHealth, ClassSnapshot};

pub async fn execute(
    config_path: Option<PathBuf>,
    class: Option<String>,
    as_of: Option<String>,
    format: String,
) -> Result<()> {
    let now = match as_of.as_deref() {
        Some(s) => parse_timestamp(s).with_context(|| format!("invalid --as-of date: {s}"))?,
        None => Utc::now(),
    };

    let (config, session, teacher) = super::connect_as_teacher(config_path).await?;
    let provider = session.provider();

    let class_ids = match class {
        Some(id) => vec![id],
        None => provider
            .list_classes(&ListFilter::all().teacher(teacher.id.as_str()))
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect(),
    };
    if class_ids.is_empty() {
        anyhow::bail!("no classes found for {}", teacher.username);
    }

    let mut reports = Vec::with_capacity(class_ids.len());
    for class_id in &class_ids {
        let snapshot = ClassSnapshot::fetch(provider.as_ref(), class_id)
            .await
            .with_context(|| format!("failed to load class {class_id}"))?;
        reports.push(ClassHealth::compute(&snapshot, now, &config.policy.risk));
    }

    match format.as_str() {
        "markdown" | "md" => {
            let sections: Vec<String> = reports.iter().map(ClassHealth::to_markdown).collect();
            print!("{}", sections.join("\n"));
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            for report in &reports {
                print_text(report);
            }
        }
    }

    Ok(())
}

fn print_text(report: &ClassHealth) {
    println!("Class {}", report.class_id);
    println!("  Students:               {}", report.student_count);
    println!("  Lesson completion:      {}%", report.completion_rate);
    println!("  On-time submissions:    {}%", report.on_time_rate);
    println!("  Due in the next 7 days: {}", report.due_this_week);
    println!();

    if report.at_risk.is_empty() {
        println!("No students at risk.");
        println!();
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Student", "Late/missing", "Average", "Reasons"]);
    for s in &report.at_risk {
        let average = if s.graded_count == 0 {
            "-".to_string()
        } else {
            format!("{:.1}", s.average)
        };
        let reasons: Vec<String> = s.reasons.iter().map(ToString::to_string).collect();
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(s.late_count),
            Cell::new(average),
            Cell::new(reasons.join(", ")),
        ]);
    }
    println!("{table}");
    println!();
}
