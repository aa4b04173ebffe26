//! The `coursedesk validate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use coursedesk_core::import::{import_questions, read_rows};

pub fn execute(file: PathBuf) -> Result<()> {
    let reader = std::fs::File::open(&file)
        .with_context(|| format!("failed to open {}", file.display()))?;
    let rows = read_rows(reader).with_context(|| format!("failed to read {}", file.display()))?;
    let summary = import_questions(&rows, None, None);

    println!(
        "Sheet: {} ({} rows, {} blank)",
        file.display(),
        rows.len(),
        summary.skipped_blank
    );
    for failure in &summary.failures {
        println!("  [row {}] ERROR: {}", failure.row, failure.error);
    }

    if summary.failures.is_empty() {
        println!("All {} questions valid.", summary.questions.len());
        Ok(())
    } else {
        anyhow::bail!("{} invalid row(s) found", summary.failures.len())
    }
}
