//! p123ops CLI - run Portfolio123 operation documents
//!
//! ```bash
//! p123ops run screen.yaml --csv out.csv   # Run a document, export the result
//! p123ops validate screen.yaml            # Validate a document only
//! p123ops operations                      # List operations and their properties
//! ```
//!
//! Credentials come from `P123_API_ID` / `P123_API_KEY` (a `.env` file is
//! read when present).

use clap::{Parser, Subcommand};
use p123ops::logs::{log_error, log_info, log_success, log_warning};
use p123ops::schema::Mapping;
use p123ops::{
    load_document, process_input, ApiClient, ConsoleSink, GlobalLogger, Operation, OperationKind,
    P123Client, RunStatus,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "p123ops")]
#[command(about = "Run declarative Portfolio123 operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and run an operation document
    Run {
        /// Document file (.yaml, .yml or .json)
        document: PathBuf,

        /// Write the result table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the result table as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Validate an operation document without running it
    Validate {
        /// Document file (.yaml, .yml or .json)
        document: PathBuf,
    },

    /// Show the available operations and their properties
    Operations,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { document, csv, json } => cmd_run(&document, csv.as_deref(), json.as_deref()).await,
        Commands::Validate { document } => cmd_validate(&document).await,
        Commands::Operations => cmd_operations(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(
    document: &Path,
    csv_output: Option<&Path>,
    json_output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    log_info(format!("Loading {}", document.display()));
    let raw = load_document(document).await?;

    let client = Arc::new(P123Client::from_env()?);
    client.authenticate().await?;

    let op = Operation::try_init(client, &raw, Box::new(ConsoleSink), Arc::new(GlobalLogger)).await;
    let mut op = op?;

    let control = op.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_warning("Stopping after the current request...");
            control.stop();
        }
    });

    let status = op.run().await;
    // Preview rows are written without a trailing newline
    println!();

    if let Some(path) = csv_output {
        op.get_result().write_csv(File::create(path)?)?;
        log_success(format!("CSV written to: {}", path.display()));
    }
    if let Some(path) = json_output {
        fs::write(path, serde_json::to_string_pretty(&op.get_result().to_json())?)?;
        log_success(format!("JSON written to: {}", path.display()));
    }

    match status {
        RunStatus::Succeeded => Ok(()),
        RunStatus::Stopped => {
            log_warning("Operation stopped");
            Ok(())
        }
        other => Err(format!("Operation finished with status {:?}", other).into()),
    }
}

async fn cmd_validate(document: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log_info(format!("Validating {}", document.display()));
    let raw = load_document(document).await?;

    match process_input(&raw, &GlobalLogger) {
        Ok(doc) => {
            log_success(format!(
                "Valid {} document ({} iterations)",
                doc.kind,
                doc.iterations.len()
            ));
            Ok(())
        }
        Err(e) => {
            log_error("Document is not valid");
            Err(e.into())
        }
    }
}

fn cmd_operations() -> Result<(), Box<dyn std::error::Error>> {
    for kind in OperationKind::ALL {
        let spec = kind.spec();
        println!("{}", kind);
        print_properties("Default Settings", &spec.settings);
        if let Some(iterations) = &spec.iterations {
            print_properties("Iterations", iterations);
        }
        println!();
    }
    Ok(())
}

fn print_properties(section: &str, mapping: &Mapping) {
    println!("  {}:", section);
    for (name, spec) in mapping.iter() {
        let required = if spec.required { " (required)" } else { "" };
        println!("    - {}{}", name, required);
    }
}
