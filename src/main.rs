use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use seo_audit::config::{date_range, Settings};
use seo_audit::error::{SourceUnavailableError, Unavailable};
use seo_audit::export::{export, ExportFilter};
use seo_audit::fetch::{read_json, AnalyticsQuery, GoogleClient, SearchConsoleQuery};
use seo_audit::model::{RuleId, Severity};
use seo_audit::rules::inputs;
use seo_audit::source::{
    AnalyticsAdapter, AnalyticsResponse, MetadataTable, MetadataTableAdapter, SearchConsoleAdapter,
    SearchConsoleResponse, SourceAdapter, SourceKind,
};
use seo_audit::summary::Summary;
use seo_audit::{run_audit, AuditInputs, SourceResult};

#[derive(Parser)]
#[command(name = "seo_audit", about = "Page metadata + Search Console + GA4 audit")]
struct Cli {
    /// Settings file (default: ./seo-audit.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the sources, run the rules and write the CSV report
    Run(RunArgs),
    /// Print the canonical key for a URL
    Normalize {
        url: String,
        /// Base domain / property to strip
        #[arg(short, long)]
        base: Option<String>,
    },
    /// List the audit rules
    Rules,
}

#[derive(Args)]
struct RunArgs {
    /// Page metadata CSV (crawler export or a previous report)
    #[arg(short, long)]
    metadata: Option<PathBuf>,
    /// Saved Search Console searchAnalytics/query response
    #[arg(long)]
    search_console_json: Option<PathBuf>,
    /// Saved GA4 runReport response
    #[arg(long)]
    analytics_json: Option<PathBuf>,
    /// Query the Google APIs for sources not given as files
    #[arg(long)]
    fetch: bool,
    /// Report destination (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Overrides base_domain from settings
    #[arg(long)]
    base_domain: Option<String>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Only rows with at least one finding
    #[arg(long, conflicts_with_all = ["severity", "rule"])]
    only_flagged: bool,
    /// Only rows with a finding of this severity
    #[arg(long, conflicts_with = "rule")]
    severity: Option<Severity>,
    /// Only rows flagged by this rule
    #[arg(long)]
    rule: Option<RuleId>,
}

impl RunArgs {
    fn filter(&self) -> ExportFilter {
        match (self.only_flagged, self.severity, self.rule) {
            (true, _, _) => ExportFilter::Flagged,
            (_, Some(s), _) => ExportFilter::Severity(s),
            (_, _, Some(r)) => ExportFilter::Rule(r),
            _ => ExportFilter::All,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => {
            let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
            if args.base_domain.is_some() {
                settings.base_domain = args.base_domain.clone();
            }
            run(&settings, &args).await
        }
        Commands::Normalize { url, base } => {
            let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
            let base = base.or(settings.base_domain.clone());
            let key = settings.normalizer().normalize(&url, base.as_deref())?;
            println!("{}", key);
            Ok(())
        }
        Commands::Rules => {
            println!("{:<28} | {:<16} | {}", "Rule", "Severity", "Needs");
            println!("{}", "-".repeat(70));
            for rule in RuleId::all() {
                let needs: Vec<&str> = inputs(*rule).iter().map(|f| f.column()).collect();
                println!("{:<28} | {:<16} | {}", rule, rule.severity(), needs.join(", "));
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(settings: &Settings, args: &RunArgs) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("loading sources");
    pb.enable_steady_tick(Duration::from_millis(120));

    let inputs = load_sources(settings, args).await;
    pb.finish_and_clear();
    let inputs = inputs?;

    let outcome = run_audit(inputs, &settings.thresholds);
    let filter = args.filter();

    let written = match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let n = export(&outcome.report, BufWriter::new(file), |f| filter.accepts(f))?;
            info!("wrote {} rows to {}", n, path.display());
            n
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let n = export(&outcome.report, &mut lock, |f| filter.accepts(f))?;
            lock.flush()?;
            n
        }
    };

    for e in &outcome.unavailable {
        eprintln!("source skipped: {}", e);
    }
    for c in &outcome.conflicts {
        eprintln!("conflict: {}", c);
    }
    if !outcome.warnings.is_empty() {
        eprintln!("{} row warnings (see log)", outcome.warnings.len());
    }
    eprintln!("\n{}", Summary::of(&outcome.report));
    eprintln!("{} rows exported", written);
    Ok(())
}

/// Load all configured sources concurrently. Failures become skipped
/// sources; only a panicked loader task is an error.
async fn load_sources(settings: &Settings, args: &RunArgs) -> Result<AuditInputs> {
    let client = match (args.fetch, settings.access_token.as_deref()) {
        (true, Some(token)) => Some(GoogleClient::new(token)?),
        _ => None,
    };
    let today = chrono::Local::now().date_naive();

    let (metadata, search_console, analytics) = tokio::join!(
        load_metadata(settings, args),
        load_search_console(settings, args, client.as_ref(), today),
        load_analytics(settings, args, client.as_ref(), today),
    );

    Ok(AuditInputs {
        metadata: metadata?,
        search_console: search_console?,
        analytics: analytics?,
    })
}

async fn load_metadata(settings: &Settings, args: &RunArgs) -> Result<Option<SourceResult>> {
    let Some(path) = args.metadata.clone() else {
        return Ok(None);
    };
    let table = tokio::task::spawn_blocking(move || read_table(&path)).await?;
    let adapter = MetadataTableAdapter::new(settings.normalizer(), settings.base_domain.clone());
    Ok(Some(adapt(&adapter, table)))
}

async fn load_search_console(
    settings: &Settings,
    args: &RunArgs,
    client: Option<&GoogleClient>,
    today: NaiveDate,
) -> Result<Option<SourceResult>> {
    let property = settings
        .search_console
        .property_url
        .clone()
        .or_else(|| settings.base_domain.clone())
        .unwrap_or_default();
    let payload: Result<SearchConsoleResponse, SourceUnavailableError> =
        match (&args.search_console_json, client) {
            (Some(path), _) => read_json(SourceKind::SearchConsole, path),
            (None, Some(client)) if !property.is_empty() => {
                let (start, end) = date_range(
                    args.start.or(settings.search_console.start_date),
                    args.end.or(settings.search_console.end_date),
                    today,
                );
                let q = SearchConsoleQuery {
                    property_url: property.clone(),
                    start,
                    end,
                };
                client.search_console(&q).await
            }
            (None, _) if args.fetch => Err(not_configured(SourceKind::SearchConsole)),
            (None, _) => return Ok(None),
        };
    let adapter = SearchConsoleAdapter::new(settings.normalizer(), property);
    Ok(Some(adapt(&adapter, payload)))
}

async fn load_analytics(
    settings: &Settings,
    args: &RunArgs,
    client: Option<&GoogleClient>,
    today: NaiveDate,
) -> Result<Option<SourceResult>> {
    let property = settings.analytics.property_id.clone().unwrap_or_default();
    let payload: Result<AnalyticsResponse, SourceUnavailableError> =
        match (&args.analytics_json, client) {
            (Some(path), _) => read_json(SourceKind::Analytics, path),
            (None, Some(client)) if !property.is_empty() => {
                let (start, end) = date_range(
                    args.start.or(settings.analytics.start_date),
                    args.end.or(settings.analytics.end_date),
                    today,
                );
                let q = AnalyticsQuery {
                    property_id: property,
                    start,
                    end,
                };
                client.analytics(&q).await
            }
            (None, _) if args.fetch => Err(not_configured(SourceKind::Analytics)),
            (None, _) => return Ok(None),
        };
    Ok(Some(adapt(&AnalyticsAdapter::new(settings.normalizer()), payload)))
}

fn not_configured(kind: SourceKind) -> SourceUnavailableError {
    SourceUnavailableError::new(kind, Unavailable::NotConfigured, "missing access token or property")
}

fn read_table(path: &Path) -> Result<MetadataTable, SourceUnavailableError> {
    let kind = SourceKind::MetadataTable;
    let file = File::open(path).map_err(|e| {
        SourceUnavailableError::new(kind, Unavailable::Transport, format!("{}: {}", path.display(), e))
    })?;
    MetadataTable::from_reader(file).map_err(|e| {
        SourceUnavailableError::new(kind, Unavailable::Payload, format!("{}: {}", path.display(), e))
    })
}

/// A payload of the wrong shape costs only its own source.
fn adapt<A: SourceAdapter>(
    adapter: &A,
    payload: Result<A::Payload, SourceUnavailableError>,
) -> SourceResult {
    let payload = payload?;
    adapter.load(payload).map_err(|e| {
        error!("{} payload rejected: {}", adapter.kind(), e);
        SourceUnavailableError::new(adapter.kind(), Unavailable::Payload, e.to_string())
    })
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
