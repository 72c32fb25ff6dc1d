use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use owo_colors::OwoColorize;
use sql_document_loader::cli::{self, LoadTarget};
use sql_document_loader::config::ConfigOverrides;
use std::path::PathBuf;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// SQL Document Loader: stream relational rows into a document store as XML envelopes or JSON
#[derive(Parser)]
#[command(name = "sqlload", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source credentials from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a table into the document store
    Load {
        #[command(flatten)]
        config: ConfigOverrides,

        /// Write documents under this directory instead of the document store
        #[arg(short, long, conflicts_with = "dry_run")]
        output_dir: Option<PathBuf>,

        /// Read and transform every row but discard the documents
        #[arg(long)]
        dry_run: bool,

        /// Exit with an error if any batch failed
        #[arg(long)]
        strict: bool,

        /// Print the job report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the key columns used to build document URIs
    Keys {
        #[command(flatten)]
        config: ConfigOverrides,
    },

    /// Print the first rows as a single result document
    Preview {
        #[command(flatten)]
        config: ConfigOverrides,

        /// Number of rows to render
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Test authorization to the document store
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match dotenvy::from_filename(&cli.env) {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::Load {
            config,
            output_dir,
            dry_run,
            strict,
            json,
        } => {
            let target = match (output_dir, dry_run) {
                (Some(dir), _) => LoadTarget::Directory(dir),
                (None, true) => LoadTarget::DryRun,
                (None, false) => LoadTarget::Store,
            };
            let report = cli::run_load(&config, target).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if let Some(error) = &report.fatal_error {
                eyre::bail!("Load of {} failed: {}", report.table, error);
            }
            if strict && report.has_failures() {
                eyre::bail!(
                    "{} of {} batch(es) failed",
                    report.batches.batches_failed,
                    report.batches.batches_dispatched
                );
            }
        }
        Commands::Keys { config } => {
            let keys = cli::show_keys(&config).await?;
            match keys.is_empty() {
                true => log::info!("No primary key: URIs use {}", "random UUIDs".yellow()),
                false => log::info!("URI key columns: {}", keys.to_string().cyan()),
            }
        }
        Commands::Preview { config, limit } => {
            log::info!("Previewing up to {} row(s)", limit.to_string().bright_black());
            println!("{}", cli::preview_rows(&config, limit).await?);
        }
        Commands::Auth => {
            log::info!("Testing authorization");
            log::info!("{}", cli::check_store().await?);
        }
    }
    Ok(())
}
