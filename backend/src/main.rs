//! Rollcall CLI - attendee reconciliation backend
//!
//! # Main Commands
//!
//! ```bash
//! rollcall serve                    # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! rollcall parse attendees.xlsx     # Parse a spreadsheet to JSON rows
//! rollcall classify attendees.csv   # Run the column oracle on a file
//! ```

use clap::{Parser, Subcommand};
use rollcall::classify::{AiClient, SchemaOracle};
use rollcall::ingest::parse_upload;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Reconcile attendee spreadsheets into event registrations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a spreadsheet file and output its rows as JSON
    Parse {
        /// Input file (csv, xlsx, xls)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the classification oracle against a spreadsheet file
    Classify {
        /// Input file (csv, xlsx, xls)
        input: PathBuf,

        /// Number of sample rows sent to the oracle
        #[arg(long, default_value = "5")]
        sample_rows: usize,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Classify { input, sample_rows } => cmd_classify(&input, sample_rows).await,

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Parsing: {}", input.display());

    let sheet = read_sheet(input)?;

    if let Some(ref encoding) = sheet.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    if let Some(delimiter) = sheet.delimiter {
        eprintln!(
            "   Delimiter: '{}'",
            match delimiter {
                '\t' => "\\t".to_string(),
                c => c.to_string(),
            }
        );
    }
    eprintln!("   Columns: {}", sheet.headers.join(", "));
    eprintln!("Parsed {} rows", sheet.rows.len());

    let json = serde_json::to_string_pretty(&sheet.rows)?;
    write_output(&json, output)?;

    Ok(())
}

async fn cmd_classify(
    input: &Path,
    sample_rows: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Classifying: {}", input.display());

    let sheet = read_sheet(input)?;
    eprintln!("   Columns: {}", sheet.headers.join(", "));

    let sample_count = sample_rows.min(sheet.rows.len());
    eprintln!("   Sending {} sample rows to the oracle...", sample_count);

    let client = AiClient::from_env()?;
    let mapping = client
        .classify(&sheet.headers, &sheet.rows[..sample_count])
        .await?;

    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    rollcall::server::start_server(port).await
}

fn read_sheet(input: &Path) -> Result<rollcall::SheetData, Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");
    Ok(parse_upload(filename, &bytes)?)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
