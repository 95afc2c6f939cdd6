//! recon-runner: command-line driver for the financing_type reconciliation engine.
//!
//! Usage:
//!   recon-runner                    fix applications from the last 2 hours
//!   recon-runner 6                  fix applications from the last 6 hours
//!   recon-runner --ids A1,A2        fix specific applications
//!   recon-runner --once             one sweep over the configured window
//!   recon-runner --continuous       sweep every interval until Ctrl-C
//!   recon-runner --serve-events     handle JSON-lines notifications/RPCs on stdin
//!   recon-runner --diagnose         read-only consistency report
//!   recon-runner --sync-products    copy plan product listings onto producto applications

use anyhow::Result;
use clap::Parser;
use financing_recon_core::{
    batch::{BatchFixer, BatchReport, BatchScope, DEFAULT_HOURS_BACK},
    clock::{Clock, SystemClock},
    config::{Deployment, ReconConfig},
    corrector::Corrector,
    diagnostic::{AuditScope, DiagnosticProbe, DiagnosticReport},
    event_handler::EventHandler,
    product_sync::{ProductSync, ProductSyncSummary},
    store::{ApplicationStore, CrmStore},
    sweep::{SweepScheduler, SweepSummary, Sweeper},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(name = "recon-runner")]
#[command(about = "Keeps Application.financing_type consistent with its selected plan")]
struct Args {
    /// Hours to look back for the one-shot batch fix (default 2)
    hours_back: Option<String>,

    /// Run a single sweep over the configured window and exit
    #[arg(long, conflicts_with_all = ["continuous", "serve_events", "diagnose", "sync_products"])]
    once: bool,

    /// Sweep every interval until interrupted
    #[arg(long, conflicts_with_all = ["serve_events", "diagnose", "sync_products"])]
    continuous: bool,

    /// Read change notifications and RPC calls as JSON lines from stdin
    #[arg(long, conflicts_with_all = ["diagnose", "sync_products"])]
    serve_events: bool,

    /// Print a read-only consistency report
    #[arg(long, conflicts_with = "sync_products")]
    diagnose: bool,

    /// Copy product listings onto producto applications that lack them
    #[arg(long)]
    sync_products: bool,

    /// Only audit the newest N applications (with --diagnose)
    #[arg(long)]
    sample: Option<usize>,

    /// Explicit application ids to fix instead of a time window
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,

    /// Emit JSON instead of a human-readable summary
    #[arg(long)]
    json: bool,

    /// JSON configuration file
    #[arg(long, env = "RECON_CONFIG")]
    config: Option<String>,

    /// Deployment profile: always_on or light_touch
    #[arg(long, env = "RECON_PROFILE")]
    profile: Option<Deployment>,

    /// SQLite path or file: URI of the CRM store
    #[arg(long, env = "RECON_DB")]
    db: Option<String>,

    /// Store call timeout in milliseconds
    #[arg(long, env = "RECON_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Sweep interval in seconds
    #[arg(long, env = "RECON_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Sweep look-back window in minutes
    #[arg(long, env = "RECON_WINDOW_MINUTES")]
    window_minutes: Option<i64>,
}

#[derive(serde::Deserialize)]
#[serde(tag = "rpc", rename_all = "snake_case")]
enum RpcRequest {
    FixApplication {
        app_id: String,
    },
    FixRecentApplications {
        #[serde(default = "default_hours_back")]
        hours_back: u32,
    },
    Diagnose {
        #[serde(default)]
        sample: Option<usize>,
    },
    SyncProduct {
        app_id: String,
    },
    SyncProducts,
}

fn default_hours_back() -> u32 {
    DEFAULT_HOURS_BACK
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    for warning in config.warnings() {
        log::warn!("config: {warning}");
    }

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Cannot reach store at {}: {e}", config.store.path);
            std::process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let corrector = Corrector::new(store, clock);

    if args.diagnose {
        let scope = match args.sample {
            Some(n) => AuditScope::Sample(n),
            None => AuditScope::Full,
        };
        let probe = DiagnosticProbe::new(corrector);
        let report = probe.audit(scope)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_diagnostic(&report);
        }
        return Ok(());
    }

    if args.sync_products {
        let sync = ProductSync::from_corrector(&corrector);
        let summary = tokio::task::spawn_blocking(move || sync.sync_pending()).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_product_sync(&summary);
        }
        if !summary.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    if args.serve_events {
        return serve_events(corrector, &config).await;
    }

    if args.continuous {
        return run_continuous(corrector, &config).await;
    }

    if args.once {
        let sweeper = Sweeper::new(corrector, config.sweep.window());
        let summary = match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await? {
            Ok(s) => s,
            Err(e) => {
                log::error!("Sweep failed: {e}");
                std::process::exit(1);
            }
        };
        summary.log();
        if args.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_sweep(&summary);
        }
        return Ok(());
    }

    let scope = if args.ids.is_empty() {
        BatchScope::HoursBack(parse_hours_back(args.hours_back.as_deref()))
    } else {
        BatchScope::Ids(args.ids.clone())
    };
    let fixer = BatchFixer::new(corrector);
    let report = tokio::task::spawn_blocking(move || fixer.run(scope)).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_batch(&report);
    }
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

/// File → profile → CLI/env overrides, then validation.
fn build_config(args: &Args) -> Result<ReconConfig> {
    let mut config = match &args.config {
        Some(path) => ReconConfig::load(path)?,
        None => ReconConfig::default(),
    };
    if let Some(profile) = args.profile {
        config.sweep = profile.sweep();
    }
    if let Some(db) = &args.db {
        config.store.path = db.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.store.timeout_ms = ms;
    }
    if let Some(secs) = args.interval_secs {
        config.sweep.interval_secs = secs;
    }
    if let Some(mins) = args.window_minutes {
        config.sweep.window_minutes = mins;
    }
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn open_store(config: &ReconConfig) -> Result<Arc<dyn ApplicationStore>> {
    let store = CrmStore::open(&config.store.path, config.store.timeout())?;
    store.migrate()?;
    store.ping()?;
    log::info!("store: connected to {}", config.store.path);
    Ok(Arc::new(store))
}

/// Invalid or non-positive values fall back to the default.
fn parse_hours_back(raw: Option<&str>) -> u32 {
    match raw.map(str::parse::<i64>) {
        None => DEFAULT_HOURS_BACK,
        Some(Ok(h)) if h >= 1 => u32::try_from(h).unwrap_or(u32::MAX),
        Some(_) => {
            log::warn!("Invalid hours_back; using {DEFAULT_HOURS_BACK}");
            DEFAULT_HOURS_BACK
        }
    }
}

async fn run_continuous(corrector: Corrector, config: &ReconConfig) -> Result<()> {
    let sweeper = Sweeper::new(corrector, config.sweep.window());
    let scheduler = SweepScheduler::new(sweeper, config.sweep.interval());
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received shutdown signal; finishing current tick");
        }
        let _ = stop_tx.send(true);
    });

    log::info!(
        "Continuous mode: every {}s over the last {}m",
        config.sweep.interval_secs,
        config.sweep.window_minutes
    );
    let report = scheduler.run(stop_rx).await;
    println!(
        "=== STOPPED === ticks: {} | failed ticks: {} | corrected: {}",
        report.ticks, report.failed_ticks, report.total_corrected
    );
    Ok(())
}

/// One task per input line; responses are serialised through a single
/// writer so lines never interleave.
async fn serve_events(corrector: Corrector, config: &ReconConfig) -> Result<()> {
    let handler = EventHandler::new(corrector.clone(), config.events.clone());
    let fixer = Arc::new(BatchFixer::new(corrector.clone()));
    let products = ProductSync::from_corrector(&corrector);
    let probe = Arc::new(DiagnosticProbe::new(corrector));

    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received shutdown signal; draining in-flight events");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let handler = handler.clone();
        let fixer = Arc::clone(&fixer);
        let probe = Arc::clone(&probe);
        let products = products.clone();
        let out = out_tx.clone();
        tasks.spawn(async move {
            let response = tokio::task::spawn_blocking(move || {
                dispatch_line(&line, &handler, &fixer, &probe, &products)
            })
            .await
            .unwrap_or_else(|e| serde_json::json!({ "success": false, "error": e.to_string() }));
            let _ = out.send(response.to_string()).await;
        });
    }

    while tasks.join_next().await.is_some() {}
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

fn dispatch_line(
    line: &str,
    handler: &EventHandler,
    fixer: &BatchFixer,
    probe: &DiagnosticProbe,
    products: &ProductSync,
) -> serde_json::Value {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return serde_json::json!({ "success": false, "error": e.to_string() }),
    };

    if value.get("rpc").is_none() {
        return to_json(&handler.handle_json(line));
    }

    match serde_json::from_value::<RpcRequest>(value) {
        Ok(RpcRequest::FixApplication { app_id }) => to_json(&fixer.fix_application(&app_id)),
        Ok(RpcRequest::FixRecentApplications { hours_back }) => {
            to_json(&fixer.fix_recent_applications(hours_back))
        }
        Ok(RpcRequest::Diagnose { sample }) => {
            let scope = sample.map_or(AuditScope::Full, AuditScope::Sample);
            match probe.audit(scope) {
                Ok(report) => to_json(&report),
                Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
            }
        }
        Ok(RpcRequest::SyncProduct { app_id }) => match products.apply_by_id(&app_id) {
            Ok(result) => to_json(&result),
            Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
        },
        Ok(RpcRequest::SyncProducts) => to_json(&products.sync_pending()),
        Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| serde_json::json!({ "success": false, "error": e.to_string() }))
}

fn print_sweep(summary: &SweepSummary) {
    println!("=== SWEEP SUMMARY ===");
    if let Some(since) = summary.window_start {
        println!("  since:            {since}");
    }
    println!("  candidates:       {}", summary.candidates);
    println!("  already correct:  {}", summary.already_correct);
    println!("  corrected:        {}", summary.corrected);
    println!("  source not ready: {}", summary.source_not_ready);
    println!("  lookup failed:    {}", summary.lookup_failed);
    println!("  write failed:     {}", summary.write_failed);
}

fn print_batch(report: &BatchReport) {
    println!("=== BATCH FIX ===");
    if let Some(hours) = report.hours_back {
        println!("  hours back:       {hours}");
    }
    if let Some(err) = &report.error {
        println!("  error:            {err}");
        return;
    }
    println!("  total processed:  {}", report.total_processed);
    println!("  total updated:    {}", report.total_updated);
    println!("  already correct:  {}", report.summary.already_correct);
    println!("  source not ready: {}", report.summary.source_not_ready);
    println!("  failed:           {}", report.summary.failed());
    println!("  missing:          {}", report.summary.missing);
    for r in report.results.iter().filter(|r| r.updated || !r.success) {
        match &r.error {
            Some(err) => println!("  ! {} {err}", r.app_id),
            None => println!(
                "  * {} {} -> {} ({})",
                r.app_id,
                r.old_financing_type.as_deref().unwrap_or("<null>"),
                r.new_financing_type.as_deref().unwrap_or("<null>"),
                r.simulation_type.as_deref().unwrap_or("?"),
            ),
        }
    }
}

fn print_product_sync(summary: &ProductSyncSummary) {
    println!("=== PRODUCT SYNC ===");
    println!("  candidates:       {}", summary.candidates);
    println!("  synced:           {}", summary.synced);
    println!("  already synced:   {}", summary.already_synced);
    println!("  skipped:          {}", summary.skipped);
    println!("  failed:           {}", summary.failed);
    for err in &summary.errors {
        println!("  ! {err}");
    }
}

fn print_diagnostic(report: &DiagnosticReport) {
    println!("=== CONSISTENCY REPORT ===");
    println!("  total:              {}", report.total);
    println!("  correct:            {}", report.correct);
    println!("  mismatched cash:    {}", report.mismatched_cash);
    println!("  mismatched product: {}", report.mismatched_product);
    println!("  legacy spelling:    {}", report.legacy_spelling);
    println!("  unresolved:         {}", report.unresolved);
    println!("  lookup errors:      {}", report.lookup_errors);
    println!("  not applicable:     {}", report.not_applicable);
    for m in &report.mismatches {
        println!(
            "  - {} {} (expected {}, simulation_type={})",
            m.id,
            m.current.as_deref().unwrap_or("<null>"),
            m.expected,
            m.simulation_type
        );
    }
}
