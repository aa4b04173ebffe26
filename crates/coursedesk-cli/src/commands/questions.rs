//! The `coursedesk questions` commands.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use coursedesk_core::filter::ListFilter;
use coursedesk_core::import::{
    import_questions, question_to_row, read_answers, read_rows, template_rows, write_rows,
    QuestionRow,
};
use coursedesk_core::model::Question;
use coursedesk_core::question::{score_quiz, Answer};

pub async fn import(
    config_path: Option<PathBuf>,
    file: PathBuf,
    subject: Option<String>,
    topic: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let reader = std::fs::File::open(&file)
        .with_context(|| format!("failed to open {}", file.display()))?;
    let rows = read_rows(reader).with_context(|| format!("failed to read {}", file.display()))?;
    let summary = import_questions(&rows, subject.as_deref(), topic.as_deref());

    for failure in &summary.failures {
        eprintln!("  [row {}] skipped: {}", failure.row, failure.error);
    }

    if dry_run {
        println!(
            "Dry run: {} question(s) ready, {} blank row(s), {} failed.",
            summary.questions.len(),
            summary.skipped_blank,
            summary.failures.len()
        );
        return Ok(());
    }

    let (_config, session, _teacher) = super::connect_as_teacher(config_path).await?;
    let provider = session.provider();

    let mut created = 0;
    for question in summary.questions {
        provider
            .create_question(question)
            .await
            .with_context(|| format!("import stopped after {created} question(s)"))?;
        created += 1;
    }
    tracing::info!(file = %file.display(), created, "imported questions");

    println!(
        "Imported {created} question(s), skipped {} blank row(s), {} failed.",
        summary.skipped_blank,
        summary.failures.len()
    );
    Ok(())
}

pub async fn export(
    config_path: Option<PathBuf>,
    file: Option<PathBuf>,
    subject: Option<String>,
    topic: Option<String>,
) -> Result<()> {
    let (_config, session, _teacher) = super::connect_as_teacher(config_path).await?;

    let mut filter = ListFilter::all();
    filter.subject_id = subject;
    filter.topic_id = topic;
    let questions = session.provider().list_questions(&filter).await?;
    let rows: Vec<QuestionRow> = questions.iter().map(question_to_row).collect();

    emit(file.as_deref(), &rows)?;
    if let Some(path) = &file {
        println!("Exported {} question(s) to {}", rows.len(), path.display());
    }
    Ok(())
}

pub async fn check(config_path: Option<PathBuf>, file: PathBuf, format: String) -> Result<()> {
    let reader = std::fs::File::open(&file)
        .with_context(|| format!("failed to open {}", file.display()))?;
    let rows = read_answers(reader).with_context(|| format!("failed to read {}", file.display()))?;

    let (config, session, _teacher) = super::connect_as_teacher(config_path).await?;
    let bank = session.provider().list_questions(&ListFilter::all()).await?;
    let by_id: HashMap<&str, &Question> = bank.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut answers = Vec::with_capacity(rows.len());
    let mut unknown = Vec::new();
    for row in &rows {
        match by_id.get(row.question_id.as_str()) {
            Some(question) => answers.push((*question, Answer::parse_for(question, &row.answer))),
            None => unknown.push(row.question_id.as_str()),
        }
    }
    if !unknown.is_empty() {
        anyhow::bail!("unknown question id(s): {}", unknown.join(", "));
    }

    let result = score_quiz(&answers, &config.policy.grading);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            let mut table = Table::new();
            table.set_header(vec!["Question", "Answer", "Credit"]);
            for (row, item) in rows.iter().zip(&result.items) {
                table.add_row(vec![
                    Cell::new(&item.question_id),
                    Cell::new(&row.answer),
                    Cell::new(format!("{:.2}", item.credit)),
                ]);
            }
            println!("{table}");
            println!(
                "Score: {:.2}/{} ({}%)",
                result.total,
                result.items.len(),
                result.percent()
            );
        }
    }

    Ok(())
}

pub fn template(file: Option<PathBuf>) -> Result<()> {
    emit(file.as_deref(), &template_rows())?;
    if let Some(path) = &file {
        println!("Wrote template to {}", path.display());
    }
    Ok(())
}

/// Write rows to `file`, or stdout when none is given.
fn emit(file: Option<&Path>, rows: &[QuestionRow]) -> Result<()> {
    match file {
        Some(path) => {
            let out = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_rows(out, rows)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_rows(&mut lock, rows)?;
            lock.flush()?;
        }
    }
    Ok(())
}
