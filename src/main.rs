//! CLI entry point for `pec-catalog`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use pec_catalog::catalog::{CatalogManager, IngestReport, JsonStore};
use pec_catalog::config::{self, Config};
use pec_catalog::error::CatalogError;
use pec_catalog::model::catalog::Catalog;
use pec_catalog::model::message::{ExtractedMessage, MessageSummary};

#[derive(Parser)]
#[command(
    name = "pec-catalog",
    version,
    about = "Extract, group and catalog PEC certified-email archives"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (overrides the config file)
    #[arg(long, global = true, env = "PEC_CATALOG_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an archive, replacing a source with the same file name
    Ingest {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Stage an archive and add it as a new source
    Upload {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Delete a source and the messages only it lists
    Delete { source_id: String },
    /// Show the catalog grouped by subject
    Catalog {
        #[arg(long)]
        json: bool,
    },
    /// List sources
    Sources {
        #[arg(long)]
        json: bool,
    },
    /// Show one message
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Search subjects, senders and bodies
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Wipe the data directory and ingest an archive from scratch
    Reparse { path: PathBuf },
    /// Show the config file location and effective settings
    Config {
        /// Write the current settings to the config file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config();
    if let Some(dir) = cli.data_dir {
        config.general.data_dir = Some(dir);
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
        Commands::Config { init } => cmd_config(&config, init),
        command => {
            let store = JsonStore::open(config::data_dir(&config))?;
            let mut manager = CatalogManager::new(store, config);
            run(&mut manager, command)
        }
    }
}

fn run(manager: &mut CatalogManager<JsonStore>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { path, json } => cmd_ingest(manager, &path, json, IngestMode::Full),
        Commands::Upload { path, json } => cmd_ingest(manager, &path, json, IngestMode::Upload),
        Commands::Reparse { path } => cmd_ingest(manager, &path, false, IngestMode::Reparse),
        Commands::Delete { source_id } => cmd_delete(manager, &source_id),
        Commands::Catalog { json } => cmd_catalog(manager, json),
        Commands::Sources { json } => cmd_sources(manager, json),
        Commands::Show { id, json } => cmd_show(manager, &id, json),
        Commands::Search { query, json } => cmd_search(manager, &query, json),
        Commands::Completions { .. } | Commands::Manpage | Commands::Config { .. } => Ok(()),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "pec-catalog.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "pec-catalog", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        config::save_config(config)?;
    }
    match config::config_file_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config file location"),
    }
    println!("# data dir: {}", config::data_dir(config).display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[derive(Clone, Copy)]
enum IngestMode {
    Full,
    Upload,
    Reparse,
}

fn cmd_ingest(
    manager: &mut CatalogManager<JsonStore>,
    path: &Path,
    json: bool,
    mode: IngestMode,
) -> anyhow::Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Extracting [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let progress: &dyn Fn(u64, u64) = &|current, total| {
        pb.set_length(total);
        pb.set_position(current);
    };
    let report = match mode {
        IngestMode::Full => manager.ingest_full(path, Some(progress)),
        IngestMode::Upload => manager.upload(path, Some(progress)),
        IngestMode::Reparse => manager.reparse(path, Some(progress)),
    }?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_ingest_report(&report, start.elapsed());
    }
    Ok(())
}

fn cmd_delete(manager: &mut CatalogManager<JsonStore>, source_id: &str) -> anyhow::Result<()> {
    if !manager.delete_source(source_id)? {
        return Err(CatalogError::source_not_found(source_id).into());
    }
    println!("  Deleted source {source_id}");
    Ok(())
}

fn cmd_catalog(manager: &CatalogManager<JsonStore>, json: bool) -> anyhow::Result<()> {
    let catalog = manager.catalog()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        print_catalog(&catalog);
    }
    Ok(())
}

fn cmd_sources(manager: &CatalogManager<JsonStore>, json: bool) -> anyhow::Result<()> {
    let sources = manager.sources()?;
    if json {
        let output = serde_json::json!({ "sources": sources });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {} source(s)", sources.len());
    if sources.is_empty() {
        println!();
        return Ok(());
    }
    println!();
    println!(
        "  {:<17} {:<30} {:<17} {:>8}",
        "Id", "Archive", "Ingested", "Messages"
    );
    println!("  {}", "-".repeat(75));
    for source in &sources {
        let name: String = source.archive_name.chars().take(29).collect();
        println!(
            "  {:<17} {:<30} {:<17} {:>8}",
            source.id, name, source.ingested_at, source.message_count
        );
    }
    println!();
    Ok(())
}

fn cmd_show(manager: &CatalogManager<JsonStore>, id: &str, json: bool) -> anyhow::Result<()> {
    let message = manager
        .message(id)?
        .ok_or_else(|| CatalogError::message_not_found(id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        print_message(manager.store(), &message);
    }
    Ok(())
}

fn cmd_search(manager: &CatalogManager<JsonStore>, query: &str, json: bool) -> anyhow::Result<()> {
    let results = manager.search(query)?;
    if json {
        let output = serde_json::json!({
            "result_count": results.len(),
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summaries(&results);
    }
    Ok(())
}

fn print_ingest_report(report: &IngestReport, elapsed: std::time::Duration) {
    println!();
    println!("  {:<20} {}", "Archive", report.archive_name);
    println!(
        "  {:<20} {}{}",
        "Source",
        report.source_id,
        if report.replaced { " (replaced)" } else { "" }
    );
    println!("  {:<20} {}", "Envelopes", report.envelopes);
    println!("  {:<20} {}", "Messages", report.message_count);
    println!("  {:<20} {}", "Groups", report.group_count);
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!();
}

fn print_catalog(catalog: &Catalog) {
    println!();
    println!(
        "  {} message(s) in {} source(s)",
        catalog.total_messages, catalog.total_sources
    );

    for source in &catalog.sources {
        println!();
        println!(
            "  == {} ({}, {}) ==",
            source.archive_name, source.id, source.ingested_at
        );
        for group in &source.groups {
            println!();
            println!("  [{}] {}", group.member_ids.len(), group.label);
            for id in &group.member_ids {
                if let Some(summary) = source.summaries.iter().find(|s| &s.id == id) {
                    let sender: String = summary.sender.chars().take(29).collect();
                    let subject: String = summary.subject.chars().take(49).collect();
                    println!(
                        "      {:<19} {:<17} {:<30} {}",
                        summary.id, summary.date, sender, subject
                    );
                }
            }
        }
    }
    println!();
}

fn print_summaries(results: &[MessageSummary]) {
    println!();
    println!("  {} result(s)", results.len());
    println!();

    if results.is_empty() {
        return;
    }

    println!(
        "  {:<19} {:<17} {:<25} {:<40} {:>4}",
        "Id", "Date", "From", "Subject", "Att"
    );
    println!("  {}", "-".repeat(109));

    for summary in results {
        let from: String = summary.sender.chars().take(24).collect();
        let subject: String = summary.subject.chars().take(39).collect();
        println!(
            "  {:<19} {:<17} {:<25} {:<40} {:>4}",
            summary.id, summary.date, from, subject, summary.attachment_count
        );
    }
    println!();
}

fn print_message(store: &JsonStore, message: &ExtractedMessage) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<14} {}", "Id", message.id);
    println!("  {:<14} {}", "Subject", message.subject);
    println!("  {:<14} {}", "From", message.sender);
    println!("  {:<14} {}", "To", message.recipients.join(", "));
    println!("  {:<14} {}", "Date", message.date);
    println!("  {:<14} {}", "Archive", message.archive_name);
    if let Some(provider) = &message.cert_provider {
        println!("  {:<14} {}", "Provider", provider);
    }
    if let Some(cert_type) = &message.cert_type {
        println!("  {:<14} {}", "Certification", cert_type);
    }
    if let Some(cert_date) = &message.cert_date {
        println!("  {:<14} {}", "Certified at", cert_date);
    }

    if !message.attachments.is_empty() {
        println!();
        println!("  Attachments:");
        for att in &message.attachments {
            let location = store
                .attachment_path(&message.id, &att.filename)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(not stored)".to_string());
            println!(
                "    {:<40} {:<25} {:>10}{}  {}",
                att.filename,
                att.content_type,
                format_size(att.size_bytes, BINARY),
                if att.is_inline { " inline" } else { "" },
                location
            );
        }
    }

    println!();
    match (&message.body_text, &message.body_html) {
        (Some(text), _) => println!("{text}"),
        (None, Some(html)) => println!("{html}"),
        (None, None) => println!("  (no body)"),
    }
    println!();
}
