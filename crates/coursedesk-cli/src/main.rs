//! coursedesk CLI — class reports, gradebook and question bank tools.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "coursedesk", version, about = "Course management toolkit for teachers")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Class health report: completion, on-time rate and at-risk students
    Report {
        /// Class id (default: every class taught by the logged-in teacher)
        #[arg(long)]
        class: Option<String>,

        /// Evaluate due dates as of this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        as_of: Option<String>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Students × assignments grade matrix for a class
    Gradebook {
        /// Class id
        #[arg(long)]
        class: String,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Question bank import/export
    Questions {
        #[command(subcommand)]
        action: QuestionsCommand,
    },

    /// Check a question sheet without importing it
    Validate {
        /// CSV sheet to check
        #[arg(long)]
        file: PathBuf,
    },

    /// Create a starter config and question sheet template
    Init,
}

#[derive(Subcommand)]
enum QuestionsCommand {
    /// Import questions from a CSV sheet
    Import {
        /// CSV sheet to import
        #[arg(long)]
        file: PathBuf,

        /// Subject to file the questions under
        #[arg(long)]
        subject: Option<String>,

        /// Topic to file the questions under
        #[arg(long)]
        topic: Option<String>,

        /// Parse and report without creating anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Export questions as a CSV sheet
    Export {
        /// Output file (default: stdout)
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        topic: Option<String>,
    },

    /// Grade an answer sheet (question_id,answer) against the question bank
    Check {
        /// CSV answer sheet
        #[arg(long)]
        file: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Write a sheet with one sample row per question type
    Template {
        /// Output file (default: stdout)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coursedesk=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Report {
            class,
            as_of,
            format,
        } => commands::report::execute(config, class, as_of, format).await,
        Commands::Gradebook { class, format } => {
            commands::gradebook::execute(config, class, format).await
        }
        Commands::Questions { action } => match action {
            QuestionsCommand::Import {
                file,
                subject,
                topic,
                dry_run,
            } => commands::questions::import(config, file, subject, topic, dry_run).await,
            QuestionsCommand::Export {
                file,
                subject,
                topic,
            } => commands::questions::export(config, file, subject, topic).await,
            QuestionsCommand::Check { file, format } => {
                commands::questions::check(config, file, format).await
            }
            QuestionsCommand::Template { file } => commands::questions::template(file),
        },
        Commands::Validate { file } => commands::validate::execute(file),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
