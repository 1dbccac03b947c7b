use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use paysync::application::filter::FilterCriteria;
use paysync::application::mutation::{MutationGateway, MutationPayload};
use paysync::application::pipeline::{PaymentAggregator, RefreshReport};
use paysync::config::Config;
use paysync::domain::ports::{
    CurrencyFormatter, CustomerDirectoryRef, ExportFormatter, FetchQuery, SourceAdapterRef,
};
use paysync::domain::record::{DateRange, PaymentStatus, SourceKind};
use paysync::domain::transition::MutationAction;
use paysync::infrastructure::in_memory::{InMemoryDirectory, InMemorySource};
use paysync::interfaces::csv::exporter::CsvExporter;
use paysync::interfaces::currency::GroupedCurrencyFormatter;
use paysync::interfaces::json::fixture_reader::{Fixture, FixtureReader};
use paysync::interfaces::notify::TracingNotifier;
use serde_json::json;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; missing keys take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON fixture seeding the backing collections
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print aggregated metrics and the refresh report as JSON
    Report {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Write the filtered payment view as CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Apply one status change or annotation, then print refreshed metrics
    Mutate {
        #[arg(long)]
        id: String,

        /// confirm, approve, reject, refund, cancel, retry, star, unstar, flag, unflag
        #[arg(long)]
        action: MutationAction,

        /// Failure reason for reject, flag reason for flag
        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        actor: Option<String>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Case-insensitive match on customer, transaction id, reference, method or currency
    #[arg(long)]
    search: Option<String>,

    #[arg(long, value_parser = parse_status)]
    status: Option<PaymentStatus>,

    /// Display name, e.g. "M-Pesa"
    #[arg(long)]
    method: Option<String>,

    #[arg(long)]
    currency: Option<String>,

    /// Collection name, e.g. device_payments
    #[arg(long, value_parser = parse_source)]
    source: Option<SourceKind>,

    /// First local day included (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last local day included (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

fn parse_status(s: &str) -> std::result::Result<PaymentStatus, String> {
    match PaymentStatus::parse(s) {
        PaymentStatus::Unknown if !s.trim().eq_ignore_ascii_case("unknown") => {
            Err(format!("unrecognised status `{s}`"))
        }
        status => Ok(status),
    }
}

fn parse_source(s: &str) -> std::result::Result<SourceKind, String> {
    SourceKind::from_collection(s.trim()).ok_or_else(|| format!("unknown collection `{s}`"))
}

impl FilterArgs {
    fn criteria(&self, config: &Config) -> Result<FilterCriteria> {
        let mut criteria = FilterCriteria::new();
        criteria.search_text = self.search.clone();
        criteria.status = self.status;
        criteria.method = self.method.clone();
        criteria.currency = self.currency.as_ref().map(|c| c.to_ascii_uppercase());
        criteria.source = self.source;
        criteria.date_range = self.date_range(config)?;
        Ok(criteria)
    }

    fn date_range(&self, config: &Config) -> Result<Option<DateRange>> {
        if self.from.is_none() && self.to.is_none() {
            return Ok(None);
        }
        let offset = config.metrics.offset();
        let day = |date: NaiveDate| {
            DateRange::days(date, date, offset)
                .ok_or_else(|| miette!("date {date} cannot be represented"))
        };
        let start = match self.from {
            Some(date) => day(date)?.start,
            None => DateTime::<Utc>::MIN_UTC,
        };
        let end = match self.to {
            Some(date) => day(date)?.end,
            None => DateTime::<Utc>::MAX_UTC,
        };
        Ok(Some(DateRange::new(start, end)))
    }

    /// Hints pushed down to the adapters.
    fn query(&self, criteria: &FilterCriteria) -> FetchQuery {
        FetchQuery {
            date_range: criteria.date_range,
            status: criteria.status,
            method: criteria.method.clone(),
            ..FetchQuery::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_path(path).into_diagnostic()?,
        None => Config::default(),
    };
    let fixture = match &cli.fixture {
        Some(path) => FixtureReader::new(File::open(path).into_diagnostic()?)
            .fixture()
            .into_diagnostic()?,
        None => Fixture::default(),
    };

    let (sources, directory) = open_storage(cli.db_path.as_deref(), &fixture)?;
    let aggregator = Arc::new(PaymentAggregator::new(sources, directory, config.clone()));

    match cli.command {
        Command::Report { filter } => {
            let criteria = filter.criteria(&config)?;
            let report = refresh(&aggregator, filter.query(&criteria)).await?;
            let metrics = aggregator.metrics(&criteria).await;
            let formatter = GroupedCurrencyFormatter;
            let currency = &config.default_currency;
            let display = json!({
                "total_amount": formatter.format(metrics.total_amount, currency, "en-TZ"),
                "completed_amount": formatter.format(metrics.completed_amount, currency, "en-TZ"),
                "pending_amount": formatter.format(metrics.pending_amount, currency, "en-TZ"),
            });
            let output = json!({
                "metrics": metrics,
                "display": display,
                "refresh": report_json(&report),
            });
            print_json(&output)?;
        }
        Command::Export { filter, output } => {
            let criteria = filter.criteria(&config)?;
            refresh(&aggregator, filter.query(&criteria)).await?;
            let records = aggregator.view(&criteria).await;
            let exporter = CsvExporter;
            let bytes = exporter.serialize(&records).into_diagnostic()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, bytes).into_diagnostic()?;
                    info!(records = records.len(), path = %path.display(), "export written");
                }
                None => io::stdout().lock().write_all(&bytes).into_diagnostic()?,
            }
        }
        Command::Mutate {
            id,
            action,
            reason,
            actor,
        } => {
            refresh(&aggregator, FetchQuery::default()).await?;
            let record = aggregator
                .records()
                .await
                .iter()
                .find(|record| record.id == id)
                .cloned()
                .ok_or_else(|| miette!("no payment with id `{id}`"))?;

            let gateway = MutationGateway::new(Arc::clone(&aggregator), Arc::new(TracingNotifier));
            let outcome = gateway
                .mutate(&record, action, MutationPayload { reason, actor })
                .await
                .into_diagnostic()?;

            let metrics = aggregator.metrics(&FilterCriteria::new()).await;
            let output = json!({
                "mutation": {
                    "id": outcome.id,
                    "action": action,
                    "previous": outcome.previous,
                    "status": outcome.status,
                    "cascaded": outcome.cascaded,
                    "cascade_failures": outcome.cascade_failures,
                },
                "metrics": metrics,
            });
            print_json(&output)?;
        }
    }

    Ok(())
}

async fn refresh(aggregator: &PaymentAggregator, query: FetchQuery) -> Result<RefreshReport> {
    let outcome = aggregator.refresh(query).await;
    let snapshot = outcome
        .snapshot()
        .ok_or_else(|| miette!("refresh was superseded"))?;
    for failure in &snapshot.report.source_failures {
        warn!(source = %failure.source_kind, error = %failure.error, "source skipped");
    }
    Ok(snapshot.report.clone())
}

fn report_json(report: &RefreshReport) -> serde_json::Value {
    json!({
        "sequence": report.sequence,
        "fetched": report.fetched,
        "source_failures": report
            .source_failures
            .iter()
            .map(|failure| json!({ "source": failure.source_kind, "error": failure.error.to_string() }))
            .collect::<Vec<_>>(),
        "dropped": report
            .normalization_errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
        "duplicates": report.duplicates,
        "directory_error": report.directory_error.as_ref().map(ToString::to_string),
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).into_diagnostic()?;
    writeln!(stdout).into_diagnostic()?;
    Ok(())
}

type Storage = (Vec<SourceAdapterRef>, CustomerDirectoryRef);

fn in_memory_storage(fixture: &Fixture) -> Storage {
    let sources = SourceKind::PRIORITY
        .into_iter()
        .map(|kind| {
            Arc::new(InMemorySource::with_rows(kind, fixture.rows(kind).to_vec())) as SourceAdapterRef
        })
        .collect();
    let directory: CustomerDirectoryRef = Arc::new(InMemoryDirectory::new(fixture.customers.clone()));
    (sources, directory)
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<&Path>, fixture: &Fixture) -> Result<Storage> {
    use paysync::infrastructure::rocksdb::RocksDbStore;

    let Some(db_path) = db_path else {
        return Ok(in_memory_storage(fixture));
    };
    let store = RocksDbStore::open(db_path).into_diagnostic()?;
    if fixture.row_count() > 0 && store.is_empty().into_diagnostic()? {
        for kind in SourceKind::PRIORITY {
            store.import_rows(kind, fixture.rows(kind)).into_diagnostic()?;
        }
        store.import_customers(&fixture.customers).into_diagnostic()?;
        info!(rows = fixture.row_count(), "database seeded from fixture");
    }
    let sources = SourceKind::PRIORITY
        .into_iter()
        .map(|kind| Arc::new(store.source(kind)) as SourceAdapterRef)
        .collect();
    Ok((sources, Arc::new(store)))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<&Path>, fixture: &Fixture) -> Result<Storage> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_storage(fixture))
}
