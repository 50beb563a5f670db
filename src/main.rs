mod config;
mod edgar;
mod error;
mod export;
mod models;
mod pipeline;
mod scraper;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::edgar::EdgarClient;
use crate::models::InsiderTransaction;
use crate::pipeline::{
    FilingsPipeline, FilingsRequest, Pipeline, PipelineConfig, SourceStatus, TransactionFilter,
};
use crate::scraper::OpenInsiderScraper;
use crate::scraper::cleaner::clean_rows;

#[derive(Parser)]
#[command(name = "insider-tracker", about = "Insider trading tracker (OpenInsider + SEC Form 4)", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch recent insider trades from the OpenInsider screener
    Screen {
        /// Only trades in this ticker
        #[arg(short, long)]
        ticker: Option<String>,

        /// Lookback window in days
        #[arg(short, long, allow_negative_numbers = true)]
        days: Option<i64>,

        /// Row cap requested from the screener
        #[arg(long, allow_negative_numbers = true)]
        max_rows: Option<i64>,

        /// Minimum |value| in dollars (inclusive)
        #[arg(long, allow_negative_numbers = true)]
        min_value: Option<f64>,

        /// Minimum |shares| (inclusive)
        #[arg(long, allow_negative_numbers = true)]
        min_qty: Option<i64>,

        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse recent SEC filings for one ticker
    Filings {
        ticker: String,

        /// Form type to list
        #[arg(long)]
        form: Option<String>,

        /// How many recent filings to parse
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long, allow_negative_numbers = true)]
        min_value: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        min_qty: Option<i64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-normalise and filter a saved CSV table
    Clean {
        input: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        min_value: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        min_qty: Option<i64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a ticker to its SEC CIK
    Cik { ticker: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "insider_tracker=info,warn",
        1 => "insider_tracker=debug,info",
        _ => "trace",
    };

    // Logs go to stderr so CSV on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Screen {
            ticker,
            days,
            max_rows,
            min_value,
            min_qty,
            output,
        } => {
            let _t = utils::Timer::start("Screener pipeline");
            let run = PipelineConfig {
                lookback_days: days.unwrap_or(config.pipeline.lookback_days),
                ticker_filter: ticker,
                max_rows: max_rows.unwrap_or(config.pipeline.max_rows),
                min_transaction_value: min_value.unwrap_or(config.pipeline.min_transaction_value),
                min_share_quantity: min_qty.unwrap_or(config.pipeline.min_share_quantity),
            };

            let scraper = OpenInsiderScraper::new(&config.screener, &config.net)
                .context("Failed to build screener client")?;
            let report = Pipeline::new(Arc::new(scraper)).run(&run).await?;

            advise(&report.status, report.transactions.len());
            if !report.rejected.is_empty() {
                eprintln!("{} rows could not be normalised and were set aside.", report.rejected.len());
            }
            summarize(&report.transactions);
            emit(&report.transactions, output.as_deref())?;
        }

        Command::Filings {
            ticker,
            form,
            limit,
            min_value,
            min_qty,
            output,
        } => {
            let _t = utils::Timer::start(format!("Filings pipeline for {}", ticker.to_uppercase()));
            let req = FilingsRequest {
                ticker,
                form_type: form.unwrap_or_else(|| config.pipeline.form_type.clone()),
                limit: limit.unwrap_or(config.pipeline.filing_limit),
                min_transaction_value: min_value.unwrap_or(config.pipeline.min_transaction_value),
                min_share_quantity: min_qty.unwrap_or(config.pipeline.min_share_quantity),
            };

            let edgar = EdgarClient::new(&config.edgar, &config.net).context("Failed to build EDGAR client")?;
            let report = FilingsPipeline::new(edgar, config.pipeline.concurrency)
                .run_filings(&req)
                .await?;

            advise(&report.status, report.transactions.len());
            if report.errors > 0 {
                eprintln!("{} filings could not be processed.", report.errors);
            }
            summarize(&report.transactions);
            emit(&report.transactions, output.as_deref())?;
        }

        Command::Clean {
            input,
            min_value,
            min_qty,
            output,
        } => {
            let filter = TransactionFilter::new(
                min_value.unwrap_or(config.pipeline.min_transaction_value),
                min_qty.unwrap_or(config.pipeline.min_share_quantity),
            )?;
            let file = File::open(&input).with_context(|| format!("Could not open {:?}", input))?;
            let rows = export::read_csv_rows(file)?;
            let cleaned = clean_rows(rows);
            if !cleaned.rejected.is_empty() {
                eprintln!("{} rows could not be normalised and were set aside.", cleaned.rejected.len());
            }
            let txns = filter.apply(cleaned.transactions);
            summarize(&txns);
            emit(&txns, output.as_deref())?;
        }

        Command::Cik { ticker } => {
            let edgar = EdgarClient::new(&config.edgar, &config.net).context("Failed to build EDGAR client")?;
            match edgar.resolve_entity_id(&ticker).await {
                Some(cik) => println!("{}\t{}", ticker.to_uppercase(), cik),
                None => println!("{}: not found", ticker.to_uppercase()),
            }
        }
    }

    Ok(())
}

/// Visible advisory for empty or degraded results.
fn advise(status: &SourceStatus, rows: usize) {
    match status {
        SourceStatus::Ok if rows == 0 => eprintln!("No transactions matched."),
        SourceStatus::Ok => {}
        SourceStatus::Unavailable(why) => eprintln!("No data for this request: {}", why),
        SourceStatus::StructureChanged(why) => {
            eprintln!("The source page layout looks different than expected; no data parsed: {}", why)
        }
    }
}

fn summarize(txns: &[InsiderTransaction]) {
    let numeric: Vec<&InsiderTransaction> = txns.iter().filter(|t| t.is_numeric()).collect();
    let net: f64 = numeric.iter().filter_map(|t| t.total_value).sum();
    let shares = numeric
        .iter()
        .filter_map(|t| t.quantity)
        .fold(0i64, i64::saturating_add);
    info!(
        "{} transactions ({} numeric) | net value {} | net shares {}",
        txns.len(),
        numeric.len(),
        utils::fmt_money(net),
        utils::fmt_number(shares)
    );
}

fn emit(txns: &[InsiderTransaction], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Could not create {:?}", path))?;
            export::write_csv(txns, BufWriter::new(file))?;
            info!("Wrote {} rows to {:?}", txns.len(), path);
        }
        None => export::write_csv(txns, io::stdout().lock())?,
    }
    Ok(())
}
