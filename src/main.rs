//! air-sentinel: air-quality monitor and alert dispatcher.
//!
//! Single-binary Tokio application that:
//! 1. Resolves place names against an allow-list and a geocoder
//! 2. Fuses authoritative AQI with pollutant detail behind a TTL cache
//! 3. Alerts subscribers, throttled per severity tier
//! 4. Journals every alert as JSONL

mod config;
mod journal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};

use common::config::AppConfig;
use engine::{CheckReport, InMemorySubscriptionStore, Monitor, PersistenceForecaster};
use iqair_client::IqAirClient;
use journal::{now_iso, AlertJournal, JournalNotifier};
use openweather_client::OpenWeatherClient;

/// Air-quality monitor and alert dispatcher
#[derive(Parser)]
#[command(name = "air-sentinel", about = "Air-quality monitor and alert dispatcher")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Check these places instead of the configured list (repeatable).
    #[arg(long = "place")]
    places: Vec<String>,

    /// Keep sweeping the place list every `timing.watch_interval_secs`.
    #[arg(long)]
    watch: bool,

    /// Print the most polluted places and exit.
    #[arg(long)]
    rank: bool,

    /// How many places `--rank` shows.
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Attach an N-day forecast to each check.
    #[arg(long, default_value_t = 0)]
    forecast_days: u32,

    /// Print check reports as JSON on stdout.
    #[arg(long)]
    json: bool,
}

const ALERT_DIR: &str = "air-sentinel";

fn resolve_alerts_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("ALERTS_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join(ALERT_DIR);
        }
    }
    PathBuf::from("ALERTS").join(ALERT_DIR)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "air_sentinel=info,engine=info,iqair_client=info,openweather_client=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("🌫️  air-sentinel starting up...");

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let places = if cli.places.is_empty() {
        cfg.places.clone()
    } else {
        cli.places.clone()
    };
    info!("Places: {:?}", places);
    info!(
        "Cache: ttl={}s precision={} | provider timeout={}ms | IQAir quota={}/min",
        cfg.cache.ttl_secs,
        cfg.cache.coordinate_precision,
        cfg.providers.timeout_ms,
        cfg.providers.iqair_requests_per_minute,
    );
    info!(
        "Throttle windows: hazardous={}s very_unhealthy={}s unhealthy={}s",
        cfg.throttle.hazardous_window_secs,
        cfg.throttle.very_unhealthy_window_secs,
        cfg.throttle.unhealthy_window_secs,
    );

    let journal = match AlertJournal::open(resolve_alerts_dir()) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to initialize alert journal: {}", e);
            std::process::exit(1);
        }
    };
    info!("Alert journal file: {}", journal.current_file().display());
    let notifier = Arc::new(JournalNotifier::new(journal));

    let monitor = match build_monitor(&cfg, notifier.clone()) {
        Ok(m) => m,
        Err(e) => {
            error!("Provider initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    notifier
        .write_event(json!({
            "ts": now_iso(),
            "kind": "start",
            "mode": if cli.rank { "rank" } else if cli.watch { "watch" } else { "check" },
            "places": &places,
            "subscriptions": cfg.subscriptions.len(),
        }))
        .await;

    // ── Ranking mode ─────────────────────────────────────────────────
    if cli.rank {
        let ranked = monitor.rank(&places, cli.top).await;
        info!("Most polluted ({} of {}):", ranked.len(), places.len());
        for (i, r) in ranked.iter().enumerate() {
            info!(
                "  {:>2}. {:<20} AQI {:>5} {} [{}]",
                i + 1,
                r.place.name,
                r.score.rounded(),
                r.score.category,
                r.score.source
            );
        }
        if cli.json {
            print_json(&ranked);
        }
        return;
    }

    // ── One-shot mode ────────────────────────────────────────────────
    if !cli.watch {
        let failures = run_sweep(&monitor, &notifier, &places, cli.forecast_days, cli.json).await;
        if failures == places.len() {
            std::process::exit(1);
        }
        return;
    }

    // ── Watch mode ───────────────────────────────────────────────────
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.timing.watch_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("🚀 Watching {} places. Press Ctrl+C to stop.", places.len());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = interval.tick() => {
                run_sweep(&monitor, &notifier, &places, cli.forecast_days, cli.json).await;
                let purged = monitor.cache().purge_expired();
                info!(
                    "HEARTBEAT: cache_entries={} purged={} next_sweep={}s",
                    monitor.cache().len(),
                    purged,
                    cfg.timing.watch_interval_secs
                );
            }
        }
    }

    notifier
        .write_event(json!({ "ts": now_iso(), "kind": "shutdown", "reason": "ctrl_c" }))
        .await;
    info!("air-sentinel shut down.");
}

fn build_monitor(cfg: &AppConfig, notifier: Arc<JournalNotifier>) -> common::Result<Monitor> {
    let iqair = Arc::new(IqAirClient::new(cfg.iqair_api_key.clone(), &cfg.providers)?);
    let openweather = Arc::new(OpenWeatherClient::new(
        cfg.openweather_api_key.clone(),
        &cfg.providers,
    )?);
    let store = Arc::new(InMemorySubscriptionStore::new(cfg.subscriptions.clone()));

    Ok(Monitor::new(
        cfg,
        openweather.clone(),
        iqair,
        openweather,
        notifier,
        store,
    )
    .with_forecaster(Arc::new(PersistenceForecaster::default())))
}

/// Check every place once; returns how many checks failed.
async fn run_sweep(
    monitor: &Monitor,
    notifier: &JournalNotifier,
    places: &[String],
    forecast_days: u32,
    as_json: bool,
) -> usize {
    let mut failures = 0;
    for (name, result) in monitor.sweep(places, forecast_days).await {
        match result {
            Ok(report) => {
                log_report(&report);
                notifier
                    .write_event(json!({
                        "ts": now_iso(),
                        "kind": "check",
                        "place": &report.place.name,
                        "aqi": report.score.rounded(),
                        "category": report.score.category,
                        "source": report.score.source,
                        "alerts_sent": report.alerts_sent(),
                    }))
                    .await;
                if as_json {
                    print_json(&report);
                }
            }
            Err(e) => {
                failures += 1;
                warn!("Check failed for {}: {}", name, e);
            }
        }
    }
    failures
}

fn log_report(report: &CheckReport) {
    info!(
        "{}, {}: AQI {} {} ({}) PM2.5={:.1} PM10={:.1}",
        report.place.name,
        report.place.country,
        report.score.rounded(),
        report.score.category,
        report.score.source,
        report.sample.pm25,
        report.sample.pm10,
    );
    info!("  → {}", report.score.category.health_message());
    for d in &report.decisions {
        info!(
            "  → {} {}: {} ({:?})",
            d.subscription_id,
            d.subscriber,
            if d.should_send { "ALERT" } else { "skip" },
            d.reason
        );
    }
    for f in &report.forecast {
        info!(
            "  ↗ {} AQI {:.0} {} (conf={:.2})",
            f.date, f.predicted_aqi, f.category, f.confidence
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => warn!("Failed to serialize output: {}", e),
    }
}
