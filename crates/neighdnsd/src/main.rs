// # neighdnsd - Neighbor DNS Runner
//
// This binary is a THIN integration layer:
// - Reads the JSON configuration file and the environment
// - Installs the tracing subscriber
// - Builds the netlink neighbor table, the optional HTTP address lookup
//   and the Cloudflare provider
// - Runs the reconciliation engine once and exits
//
// No reconciliation, DNS or retry logic lives here; all of it is in
// neighdns-core. Scheduling is left to cron or a systemd timer.
//
// ## Environment
//
// - `NEIGHDNS_CONFIG`: path to the configuration file
//   (default: `config.json` next to the executable)
// - `NEIGHDNS_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
// - `NEIGHDNS_MODE`: `dry-run` reads everything and logs the batch without
//   submitting it
//
// ## Example
//
// ```bash
// export NEIGHDNS_CONFIG=/etc/neighdns/config.json
// export NEIGHDNS_MODE=dry-run
//
// neighdnsd
// ```

use anyhow::{Context, Result};
use neighdns_core::config::{DdnsConfig, EXAMPLE_CONFIG};
use neighdns_core::traits::AddressLookup;
use neighdns_core::{BatchOutcome, ReconcileEngine};
use neighdns_ip_http::HttpAddressLookup;
use neighdns_neigh_netlink::NetlinkNeighborTable;
use neighdns_provider_cloudflare::CloudflareProvider;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Run completed
/// - 1: Configuration or startup error
/// - 2: Runtime error (neighbor table, provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NeighdnsExitCode {
    /// Run completed (records applied, already up to date, or dry run)
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<NeighdnsExitCode> for ExitCode {
    fn from(code: NeighdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings read from the environment
#[derive(Debug)]
struct Settings {
    config_path: Option<PathBuf>,
    log_level: String,
    dry_run: bool,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Self {
        Self {
            config_path: env::var_os("NEIGHDNS_CONFIG").map(PathBuf::from),
            log_level: env::var("NEIGHDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dry_run: env::var("NEIGHDNS_MODE")
                .map(|mode| mode.eq_ignore_ascii_case("dry-run"))
                .unwrap_or(false),
        }
    }

    /// Parse `NEIGHDNS_LOG_LEVEL`
    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "NEIGHDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Resolve the configuration file path
    fn resolve_config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(DdnsConfig::default_path()?),
        }
    }
}

fn main() -> ExitCode {
    let settings = Settings::from_env();

    let log_level = match settings.level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return NeighdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NeighdnsExitCode::ConfigError.into();
    }

    let config = match load_config(&settings) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            eprintln!(
                "\nFix the configuration file (or point NEIGHDNS_CONFIG at one). \
                Example:\n\n{}",
                EXAMPLE_CONFIG
            );
            return NeighdnsExitCode::ConfigError.into();
        }
    };

    info!("Starting neighdnsd for {}", config.domain_name);

    // One run, strictly sequential
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NeighdnsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run_once(config, settings.dry_run).await {
            Ok(()) => NeighdnsExitCode::Success,
            Err(e) => {
                error!("Run failed: {:#}", e);
                exit_code_for(&e)
            }
        }
    });

    code.into()
}

/// Read and validate the configuration file
fn load_config(settings: &Settings) -> Result<DdnsConfig> {
    let path = settings.resolve_config_path()?;
    info!("Loading configuration from {}", path.display());
    DdnsConfig::load(&path).with_context(|| format!("Invalid configuration {}", path.display()))
}

/// Map a run failure to an exit code
fn exit_code_for(err: &anyhow::Error) -> NeighdnsExitCode {
    match err.downcast_ref::<neighdns_core::Error>() {
        Some(e) if e.is_config() => NeighdnsExitCode::ConfigError,
        _ => NeighdnsExitCode::RuntimeError,
    }
}

/// Build the components and run the engine once
async fn run_once(config: DdnsConfig, dry_run: bool) -> Result<()> {
    let neighbors = Box::new(NetlinkNeighborTable::new());
    let lookup = HttpAddressLookup::from_config(&config)?
        .map(|lookup| Box::new(lookup) as Box<dyn AddressLookup>);
    let provider = Box::new(CloudflareProvider::from_config(&config, dry_run)?);

    let (engine, mut events) = ReconcileEngine::new(config, neighbors, lookup, provider)?;

    let report = engine.run().await?;

    while let Ok(event) = events.try_recv() {
        debug!("Engine event: {:?}", event);
    }

    match report.outcome {
        Some(BatchOutcome::Applied { operations }) => {
            info!("Run complete: {} change(s) applied", operations)
        }
        Some(BatchOutcome::DryRun { operations }) => {
            info!("Run complete: {} change(s) planned, dry run", operations)
        }
        None => info!("Run complete: records already up to date"),
    }

    Ok(())
}
