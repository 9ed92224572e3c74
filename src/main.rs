mod clean;
mod config;
mod export;
mod heuristics;
mod metrics;
mod pdf_extract;
mod record_db;

use clap::{Parser, Subcommand};
use config::Config;
use metrics::YearFilter;
use pdf_extract::InputDocument;
use record_db::InvoiceStore;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "invoice_dashboard")]
#[command(about = "Scrape IDT invoice PDFs and summarise spending per year and purchase order")]
#[command(version)]
struct Cli {
    /// TOML config file (store path, keyword template)
    #[arg(short, long, default_value = ".config/invoice_dashboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from invoice PDFs and print them as JSON
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Also write the extracted rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Append the extracted rows to the invoice store
        #[arg(long)]
        push: bool,
    },
    /// Show the numbered text lines of one PDF and the fields found in them
    Inspect { file: PathBuf },
    /// Print key metrics, chart tables and an optional PO breakdown as JSON
    Dashboard {
        /// A year, or "All Years"
        #[arg(long, default_value = "All Years")]
        year: YearFilter,
        /// Purchase order to break down
        #[arg(long)]
        po: Option<String>,
    },
    /// Write the cleaned invoice table as CSV
    Export { out: PathBuf },
    /// Drop stored rows whose invoice number was already seen
    Compact,
    /// Manage the PO -> funding source lookup
    Funding {
        #[command(subcommand)]
        action: FundingAction,
    },
    /// Edit the keyword template in the config file
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum FundingAction {
    /// Map a PO to the WBS element that funds it
    Add { po: String, wbs: String },
    /// List known funding sources
    List,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Set how many lines below the keyword its value sits (omit for same-line)
    SetOffset { keyword: String, offset: Option<usize> },
}

fn open_store(cfg: &Config) -> Result<InvoiceStore, Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(&cfg.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    info!(db_path = %cfg.db_path, "Opening invoice store");
    Ok(InvoiceStore::new(&cfg.db_path)?)
}

fn run_extract(
    cfg: &Config,
    files: &[PathBuf],
    csv_out: Option<&Path>,
    push: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let docs = files
        .iter()
        .map(InputDocument::load)
        .collect::<Result<Vec<_>, _>>()?;

    let extracted = pdf_extract::extract_batch(&docs, &cfg.template);
    println!("{}", serde_json::to_string_pretty(&extracted)?);

    if let Some(path) = csv_out {
        let rows: Vec<_> = extracted.iter().map(|e| e.fields.clone()).collect();
        export::write_field_maps(File::create(path)?, &rows)?;
        info!(path = %path.display(), "CSV written");
    }

    if push {
        let mut store = open_store(cfg)?;
        store.append(&extracted)?;
        let (total, distinct, _) = store.get_counts()?;
        info!(rows_total = total, invoices_distinct = distinct, "Store updated");
    }

    Ok(())
}

fn run_dashboard(
    cfg: &Config,
    year: YearFilter,
    po: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(cfg)?;
    let cleaned = clean::clean(&store.read_field_maps()?);
    let funding = store.funding_sources()?;

    if let Some(po) = po {
        if !funding.iter().any(|f| f.po_number == po.trim()) {
            warn!(po = %po, "PO has no funding source on record");
        }
    }

    let report = metrics::dashboard(&cleaned, year, po, &funding, cfg.base_unit_price);
    info!(
        year = %year,
        orders = report.key_metrics.order_count,
        skipped = report.skipped_rows.len(),
        "Dashboard computed"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_export(cfg: &Config, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(cfg)?;
    let mut cleaned = clean::clean(&store.read_field_maps()?);
    cleaned.records.sort_by_key(|r| r.invoice_date);
    export::write_records(File::create(out)?, &cleaned.records)?;
    info!(
        path = %out.display(),
        records = cleaned.records.len(),
        skipped = cleaned.failures.len(),
        "Export complete"
    );
    Ok(())
}

fn run_compact(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(cfg)?;
    let rows = store.read_all()?;
    let kept = clean::dedup_by(&rows, |r| r.fields.invoice_number.as_str());

    if kept.len() == rows.len() {
        info!(rows = rows.len(), "No duplicate invoices — nothing to compact");
        return Ok(());
    }

    for dropped in rows.iter().filter(|r| !kept.iter().any(|k| k.id == r.id)) {
        info!(
            id = dropped.id,
            invoice_no = %dropped.fields.invoice_number,
            source = ?dropped.source_file,
            "Dropping duplicate"
        );
    }
    store.overwrite(&kept)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing; stdout is reserved for JSON/CSV output
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Extract { files, csv, push } => run_extract(&cfg, &files, csv.as_deref(), push)?,
        Commands::Inspect { file } => pdf_extract::inspect_pdf(&file, &cfg.template)?,
        Commands::Dashboard { year, po } => run_dashboard(&cfg, year, po.as_deref())?,
        Commands::Export { out } => run_export(&cfg, &out)?,
        Commands::Compact => run_compact(&cfg)?,
        Commands::Funding { action } => {
            let store = open_store(&cfg)?;
            match action {
                FundingAction::Add { po, wbs } => store.set_funding_source(&po, &wbs)?,
                FundingAction::List => {
                    println!("{}", serde_json::to_string_pretty(&store.funding_sources()?)?);
                }
            }
        }
        Commands::Template { action } => match action {
            TemplateAction::SetOffset { keyword, offset } => {
                Config::update_offset(&cli.config, &keyword, offset)?;
            }
        },
    }

    Ok(())
}
