//! The `coursedesk init` command.

use std::path::Path;

use anyhow::Result;

use coursedesk_core::import::{template_rows, write_rows};

pub fn execute() -> Result<()> {
    if Path::new("coursedesk.toml").exists() {
        println!("coursedesk.toml already exists, skipping.");
    } else {
        std::fs::write("coursedesk.toml", SAMPLE_CONFIG)?;
        println!("Created coursedesk.toml");
    }

    let template = Path::new("questions-template.csv");
    if template.exists() {
        println!("questions-template.csv already exists, skipping.");
    } else {
        let file = std::fs::File::create(template)?;
        write_rows(file, &template_rows())?;
        println!("Created questions-template.csv");
    }

    println!("\nNext steps:");
    println!("  1. Edit coursedesk.toml: pick a backend and set your login");
    println!("  2. Export COURSEDESK_SEED_PASSWORD and COURSEDESK_PASSWORD");
    println!("     (the demo store is created on first run and keeps that password)");
    println!("  3. Run: coursedesk report");
    println!("  4. Run: coursedesk validate --file questions-template.csv");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# coursedesk configuration

# Local store seeded with demo data. Every demo account uses seed_password.
[backend]
type = "memory"
data_file = "coursedesk-data.json"
seed = true
seed_password = "${COURSEDESK_SEED_PASSWORD}"

# Remote backend instead:
# [backend]
# type = "rpc"
# endpoint = "https://script.google.com/macros/s/<deployment>/exec"
# timeout_secs = 30

[auth]
username = "gv.an"
password = "${COURSEDESK_PASSWORD}"

[policy.risk]
max_late = 2
min_average = 5.0

[policy.grading]
case_sensitive = true
trim_whitespace = false
"#;
