use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wxbridge::config::LoggingConfig;
use wxbridge::setup::DistrictTable;
use wxbridge::setup::LocationSetup;
use wxbridge::setup::SetupMode;
use wxbridge::BaiduGateway;
use wxbridge::Config;
use wxbridge::ConfigError;
use wxbridge::Coordinator;
use wxbridge::EntitySet;
use wxbridge::LocationDescriptor;

#[derive(Debug, Parser)]
#[command(name = "wxbridge", version, about = "Baidu weather bridge for home automation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the weather service and serve entities until Ctrl+C
    Run {
        /// Config files, merged in order
        #[arg(required = true)]
        config: Vec<PathBuf>,
    },

    /// Validate the configuration and check the API key against the service
    Check {
        /// Config files, merged in order
        #[arg(required = true)]
        config: Vec<PathBuf>,

        /// Skip the API key check
        #[arg(long)]
        offline: bool,
    },

    /// Look up a district id and print the matching config block
    Locate {
        /// District table CSV
        #[arg(long)]
        table: PathBuf,
        #[arg(long)]
        province: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        district: Option<String>,
    },
}

#[derive(Serialize)]
struct LocationBlock<'a> {
    weather: WeatherBlock<'a>,
}

#[derive(Serialize)]
struct WeatherBlock<'a> {
    location: &'a LocationDescriptor,
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Run { config } => run(&config).await,
        Command::Check { config, offline } => check(&config, offline).await,
        Command::Locate {
            table,
            province,
            city,
            district,
        } => locate(&table, [province, city, district]),
    }
}

fn init_logging(logging: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(logging.filter())
        .init();
}

/// Load and validate config, printing warnings and rendered errors to stderr.
fn load_config(paths: &[PathBuf]) -> Result<Config> {
    match Config::from_files(paths) {
        Ok((config, warnings)) => {
            if !warnings.is_empty() {
                eprint!("{}", wxbridge::format_diagnostics(&warnings));
            }
            Ok(config)
        }
        Err(ConfigError::Invalid { rendered, .. }) => {
            eprint!("{}", rendered);
            bail!("configuration is invalid");
        }
        Err(e) => Err(e).context("failed to load configuration"),
    }
}

async fn run(paths: &[PathBuf]) -> Result<()> {
    let config = load_config(paths)?;
    init_logging(&config.logging);

    tracing::info!("wxbridge starting");
    tracing::info!(
        "Weather '{}' at {} every {}s",
        config.weather.name,
        config.weather.location,
        config.weather.update_interval_seconds
    );

    let gateway = Arc::new(BaiduGateway::new().context("failed to create HTTP client")?);
    let coordinator = Arc::new(Coordinator::new(
        gateway,
        config.weather.location.clone(),
        config.weather.api_key.clone(),
        config.weather.update_interval(),
    ));

    let entities = Arc::new(EntitySet::register(&coordinator, &config.weather.name));
    for entity in entities.all() {
        tracing::debug!("Registered entity {}", entity.entity_id());
    }

    let scheduler = tokio::spawn(coordinator.clone().run());
    let shutdown = CancellationToken::new();

    #[cfg(feature = "api")]
    let api_server = if config.api.enabled {
        let state = Arc::new(wxbridge::api::AppState {
            version: env!("CARGO_PKG_VERSION"),
            config: config.clone(),
            coordinator: coordinator.clone(),
            entities: entities.clone(),
        });
        Some(tokio::spawn(wxbridge::api::serve(
            config.api.socket_addr(),
            state,
            shutdown.clone(),
        )))
    } else {
        tracing::info!("HTTP API disabled");
        None
    };

    tracing::info!("Press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    shutdown.cancel();
    entities.unregister(&coordinator);
    coordinator.shutdown();

    #[cfg(feature = "api")]
    {
        if let Some(server) = api_server {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("HTTP API server failed: {}", e),
                Err(e) => tracing::error!("HTTP API task panicked: {}", e),
            }
        }
    }
    scheduler.await.context("coordinator task panicked")?;

    tracing::info!("wxbridge shutdown complete");
    Ok(())
}

async fn check(paths: &[PathBuf], offline: bool) -> Result<()> {
    let config = load_config(paths)?;
    println!("Configuration OK: '{}' at {}", config.weather.name, config.weather.location);

    if offline {
        return Ok(());
    }

    let gateway = BaiduGateway::new().context("failed to create HTTP client")?;
    let valid = gateway
        .validate_key(&config.weather.api_key)
        .await
        .context("could not reach the weather service")?;
    if !valid {
        bail!("the API key was rejected by the weather service");
    }
    println!("API key OK");
    Ok(())
}

/// Walk the setup flow with whatever levels were given. Stops early and lists the
/// choices for the first missing level.
fn locate(table_path: &Path, levels: [Option<String>; 3]) -> Result<()> {
    let table = DistrictTable::from_file(table_path)?;
    let mut setup = LocationSetup::start(SetupMode::District);

    for level in levels {
        let Some(choice) = level else {
            for option in setup.options(&table) {
                println!("{}", option);
            }
            return Ok(());
        };
        setup = setup.select(&table, &choice)?;
    }

    let location = setup.finish()?;
    let block = toml::to_string(&LocationBlock {
        weather: WeatherBlock {
            location: &location,
        },
    })
    .context("failed to render location")?;
    print!("{}", block);
    Ok(())
}
