//! The `coursedesk gradebook` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use coursedesk_core::gradebook::Gradebook;
use coursedesk_core::reporting::ClassSnapshot;

pub async fn execute(config_path: Option<PathBuf>, class: String, format: String) -> Result<()> {
    let (_config, session, _teacher) = super::connect_as_teacher(config_path).await?;
    let provider = session.provider();

    let snapshot = ClassSnapshot::fetch(provider.as_ref(), &class)
        .await
        .with_context(|| format!("failed to load class {class}"))?;
    let book = Gradebook::build(&snapshot.students, &snapshot.assignments, &snapshot.submissions);

    match format.as_str() {
        "markdown" | "md" => print!("{}", book.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&book)?),
        _ => {
            let mut table = Table::new();
            let mut header = vec!["Student".to_string()];
            header.extend(book.assignments.iter().map(|(_, title)| title.clone()));
            header.push("Average".to_string());
            table.set_header(header);

            for row in &book.rows {
                let mut cells = vec![Cell::new(&row.student_name)];
                cells.extend(row.cells.iter().map(Cell::new));
                cells.push(Cell::new(row.average_display()));
                table.add_row(cells);
            }
            println!("{table}");
        }
    }

    Ok(())
}
