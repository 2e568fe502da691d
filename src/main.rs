use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

mod aggregate;
mod charts;
mod columns;
mod db;
mod error;
mod grading;
mod models;
mod pipeline;
mod report;
mod store;
mod table;
mod workbook;

use error::AnalysisError;
use models::UploadRecord;
use store::{BlobKind, StoreError, UploadStore};

#[derive(Parser)]
#[command(name = "exam-analytics")]
#[command(
    about = "Exam score analysis: grading, ranking, charts and report cards",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Register an exam score file and run the analysis
    Upload {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        title: String,
        /// JSON file holding the grading rule list
        #[arg(long)]
        scheme: Option<PathBuf>,
        /// Comma-separated header terms to exclude from subject detection
        #[arg(long)]
        ignore: Option<String>,
        /// School name printed on report cards
        #[arg(long)]
        school: Option<String>,
    },
    /// Run the pipeline for a registered upload
    Process {
        id: Uuid,
    },
    /// Re-run a completed or failed upload from its stored source file
    Retry {
        id: Uuid,
    },
    /// Show one upload's status, message and artifact paths
    Show {
        id: Uuid,
    },
    /// List uploads, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;
    let storage_root =
        std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./storage".to_string());

    let pool = db::connect(&database_url).await?;
    let store = db::PgStore::new(pool.clone(), storage_root);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Upload {
            file,
            title,
            scheme,
            ignore,
            school,
        } => {
            let record =
                register_upload(&store, &file, title, scheme.as_deref(), ignore, school).await?;
            println!("Registered upload {} ({}).", record.id, record.title);
            let record = pipeline::process_upload(&store, record.id).await?;
            print_record(&record);
        }
        Commands::Process { id } | Commands::Retry { id } => {
            match pipeline::process_upload(&store, id).await {
                Ok(record) => print_record(&record),
                Err(StoreError::AlreadyProcessing(id)) => {
                    println!("Upload {id} is already being processed; try again once it finishes.");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Show { id } => {
            let record = store.fetch(id).await?;
            print_record(&record);
        }
        Commands::List { limit } => {
            let records = store.list(limit).await?;
            if records.is_empty() {
                println!("No uploads registered.");
            }
            for record in records {
                println!(
                    "{} {} [{}] {}",
                    record.id,
                    record.uploaded_at.format("%Y-%m-%d %H:%M"),
                    record.status,
                    record.title
                );
            }
        }
    }

    Ok(())
}

/// Validate the file and configuration, persist the source blob and insert a
/// Pending record.
async fn register_upload(
    store: &dyn UploadStore,
    file: &Path,
    title: String,
    scheme_path: Option<&Path>,
    ignore: Option<String>,
    school: Option<String>,
) -> anyhow::Result<UploadRecord> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("upload path has no usable file name")?;
    if !table::supported_extension(filename) {
        return Err(AnalysisError::UnsupportedFormat(table::extension_of(filename)).into());
    }

    let metadata = std::fs::metadata(file)
        .with_context(|| format!("cannot stat {}", file.display()))?;
    if metadata.len() > table::MAX_UPLOAD_BYTES {
        anyhow::bail!(
            "{} exceeds the {} MB upload limit",
            file.display(),
            table::MAX_UPLOAD_BYTES / (1024 * 1024)
        );
    }
    let bytes =
        std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;

    let grading_scheme = match scheme_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read grading scheme {}", path.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&text).context("grading scheme is not valid JSON")?;
            if !value.is_array() {
                anyhow::bail!("grading scheme must be a JSON list of rules");
            }
            Some(text)
        }
        None => None,
    };

    let source_path = store.put_blob(BlobKind::Upload, filename, &bytes).await?;
    let mut record = UploadRecord::new(Uuid::new_v4(), title, source_path);
    record.school_name = school;
    record.grading_scheme = grading_scheme;
    record.custom_ignore_columns = ignore;
    store.insert(&record).await?;
    Ok(record)
}

fn print_record(record: &UploadRecord) {
    println!("{} [{}] {}", record.id, record.status, record.title);
    if !record.message.is_empty() {
        println!("  message: {}", record.message);
    }
    let artifact = |label: &str, value: &Option<String>| match value {
        Some(path) => println!("  {label}: {path}"),
        None => println!("  {label}: -"),
    };
    artifact("results", &record.processed_file);
    artifact("subject chart", &record.subject_chart);
    artifact("pass-rate chart", &record.passrate_chart);
    artifact("reports", &record.reports_zip);
}
