//! statcan CLI - Fetch and pivot Statistics Canada tables
//!
//! # Commands
//!
//! ```bash
//! statcan id <url>                          # Show the resolved dataset identity
//! statcan metadata <url>                    # Fetch and print metadata as JSON
//! statcan data <url> -o wide.csv            # Fetch and pivot to wide CSV
//! statcan check <url>... --workers 16       # Check which urls still resolve
//! ```
//!
//! # Offline Commands
//!
//! ```bash
//! statcan sections meta.csv                 # List metadata sections and roles
//! statcan pivot data.csv --metadata meta.csv
//! ```

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use statcan::{
    check_liveness, classify, Config, DataOptions, Dataset, MetadataText, PivotSchema,
    ResourceUrl, Session,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "statcan")]
#[command(about = "Fetch Statistics Canada tables and pivot them to wide format", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a bundle url to its dataset identity
    Id {
        /// Bundle url, e.g. https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip
        locator: String,
    },

    /// List the sections of a local metadata file
    Sections {
        /// Metadata CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch a bundle and print its metadata as JSON
    Metadata {
        /// Bundle url
        locator: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch a bundle and write its data in wide format
    Data {
        /// Bundle url
        locator: String,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep REF_DATE and GEO column names
        #[arg(long)]
        keep_names: bool,

        /// Also store the wide table in the repo's dataset directory
        #[arg(long)]
        save: bool,
    },

    /// Pivot a local data file using a local metadata file
    Pivot {
        /// Data CSV file (long format)
        input: PathBuf,

        /// Metadata CSV file
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep REF_DATE and GEO column names
        #[arg(long)]
        keep_names: bool,
    },

    /// Check whether bundle urls still resolve
    Check {
        /// Bundle urls
        #[arg(required = true)]
        locators: Vec<String>,

        /// Concurrent requests (default: STATCAN_WORKERS or 8)
        #[arg(short, long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Id { locator } => cmd_id(&locator),

        Commands::Sections { input, output } => cmd_sections(&input, output.as_deref()),

        Commands::Metadata { locator, output } => cmd_metadata(&locator, output.as_deref()).await,

        Commands::Data {
            locator,
            output,
            keep_names,
            save,
        } => cmd_data(&locator, output.as_deref(), keep_names, save).await,

        Commands::Pivot {
            input,
            metadata,
            output,
            keep_names,
        } => cmd_pivot(&input, &metadata, output.as_deref(), keep_names),

        Commands::Check { locators, workers } => cmd_check(locators, workers).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_id(locator: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = ResourceUrl::parse(locator)?;
    let id = url.id();
    let out = json!({
        "id": id.as_str(),
        "productId": id.product_id(),
        "language": url.language,
        "extension": url.extension,
        "dataFile": url.data_file,
        "metadataFile": url.metadata_file,
    });
    write_output(&serde_json::to_string_pretty(&out)?, None)
}

fn cmd_sections(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing metadata: {}", input.display());

    let text = MetadataText::read(input)?;
    eprintln!("   Encoding: {}", text.encoding());

    let mut listed: Vec<Value> = Vec::new();
    for section in text.sections() {
        let section = section?;
        let line = section.line();
        let rows = section.len();
        let header = section.header().to_vec();
        let role = classify(section).map(|s| s.role.to_string());
        listed.push(json!({
            "line": line,
            "role": role,
            "header": header,
            "rows": rows,
        }));
    }

    eprintln!("✅ Found {} sections", listed.len());
    write_output(&serde_json::to_string_pretty(&listed)?, output)
}

async fn cmd_metadata(locator: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::from_config(&Config::from_env()?)?;

    eprintln!("📄 Metadata: {}", locator);
    let metadata = session.metadata(locator).await?;
    if let Ok(title) = metadata.cube_title() {
        eprintln!("   Title: {}", title);
    }
    if let Ok(pivot) = metadata.pivot_column() {
        eprintln!("   Pivot column: {}", pivot);
    }

    write_output(&serde_json::to_string_pretty(&*metadata)?, output)
}

async fn cmd_data(
    locator: &str,
    output: Option<&Path>,
    keep_names: bool,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::from_config(&Config::from_env()?)?;
    let options = DataOptions {
        rename_columns: !keep_names,
    };

    eprintln!("📄 Processing: {}", locator);
    let dataset = session.dataset(locator, options).await?;
    report(&dataset);

    let csv = wide_csv(&dataset)?;
    if save {
        if let Some(id) = &dataset.resource {
            let path = session.fetcher().repo().dataset_path(id);
            fs::write(&path, &csv)?;
            eprintln!("   💾 Saved to: {}", path.display());
        }
    }

    write_output(&csv, output)
}

fn cmd_pivot(
    input: &Path,
    metadata: &Path,
    output: Option<&Path>,
    keep_names: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = DataOptions {
        rename_columns: !keep_names,
    };

    eprintln!("📄 Processing: {}", input.display());
    let dataset = Dataset::from_files(input, metadata, &PivotSchema::default(), &options)?;
    report(&dataset);

    write_output(&wide_csv(&dataset)?, output)
}

async fn cmd_check(locators: Vec<String>, workers: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let workers = workers.unwrap_or(config.workers);
    let session = Session::from_config(&config)?;

    eprintln!("🔎 Checking {} url(s) with {} workers", locators.len(), workers);
    let results = check_liveness(session.fetcher(), locators, workers).await;

    let live = results.values().filter(|l| l.is_live()).count();
    eprintln!("📊 Results: {} live, {} not live", live, results.len() - live);

    let sorted: BTreeMap<_, _> = results.into_iter().collect();
    write_output(&serde_json::to_string_pretty(&sorted)?, None)
}

fn report(dataset: &Dataset) {
    let table = &dataset.table;
    eprintln!("   Pivot column: {}", table.pivot_column());
    eprintln!("   Key columns: {}", table.key_columns().join(", "));
    eprintln!("   Pivot values: {}", table.pivot_values().len());
    if dataset.collisions() > 0 {
        eprintln!("   ⚠️  Collisions: {} (maximum kept)", dataset.collisions());
    }
    eprintln!("✅ {} wide rows", table.len());
}

fn wide_csv(dataset: &Dataset) -> Result<String, Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    dataset.table.write_csv(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
