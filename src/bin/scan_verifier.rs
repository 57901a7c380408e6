//! Scan Verifier console utility
//!
//! The configuration file, scan credentials and log level come from the
//! command line or their `SCAN_VERIFIER_*` environment variables. Every other
//! setting is looked up by key in the environment, then in the JSON file.
//! The process always exits with status 0.

use clap::Parser;
use rust_db_support::backends::builtin_providers;
use rust_db_support::core::config::{EnvSource, JsonFileSource, MapSource, Settings};
use rust_db_support::core::email::PickupDirectoryTransport;
use rust_db_support::scan;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_PREFIX: &str = "SCAN_VERIFIER";
const DEFAULT_CONFIG_FILE: &str = "scan_verifier.json";

/// Verify scanned documents against the archive and mail the report.
#[derive(Debug, Clone, Parser)]
#[command(name = "scan_verifier", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "SCAN_VERIFIER_CONFIG")]
    config: String,

    /// Log level filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "SCAN_VERIFIER_LOG_LEVEL")]
    log_level: String,

    #[arg(long, env = "SCAN_VERIFIER_SCANUSER", hide = true)]
    scan_user: Option<String>,

    #[arg(long, env = "SCAN_VERIFIER_SCANPASSWORD", hide = true, hide_env_values = true)]
    scan_password: Option<String>,
}

impl Cli {
    /// Values fixed at startup, consulted before any other source.
    fn overrides(&self) -> MapSource {
        let mut source = MapSource::new();
        if let Some(user) = &self.scan_user {
            source.insert("ScanUser", user.as_str());
        }
        if let Some(password) = &self.scan_password {
            source.insert("ScanPassword", password.as_str());
        }
        source
    }
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::new()
        .with_source(cli.overrides())
        .with_source(EnvSource::new(ENV_PREFIX));

    if Path::new(&cli.config).exists() {
        match JsonFileSource::load(&cli.config) {
            Ok(source) => settings.add_source(source),
            Err(e) => warn!(error = %e, "ignoring configuration file"),
        }
    } else {
        info!(path = %cli.config, "no configuration file, using environment only");
    }
    settings
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    println!(
        "Scan Verification Report - Version: {}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = load_settings(&cli);
    let pickup = settings.read_string("PickupDirectory", "mail_pickup");
    let from = settings.read_string("EmailTo", "");
    let transport = PickupDirectoryTransport::new(pickup, from);

    let (results, _audit) = scan::run(&settings, Arc::new(builtin_providers()), &transport).await;
    info!(
        connected = results.connect_to_database,
        problems = results.has_problems(),
        "scan verification finished"
    );
}
