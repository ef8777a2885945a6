//! Pi Sentry - Proximity and Battery Monitoring Binary
//!
//! A standalone binary for a Raspberry Pi appliance: time-of-flight ranging,
//! battery estimation, LED ring control, and a local web dashboard.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use pi_sentry::{
    start_web_server, ApiContext, Peripherals, SharedState, Store, Supervisor, WebConfig,
    DEFAULT_DB_PATH, DEFAULT_WEB_PORT,
};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pi_sentry")]
#[command(about = "Pi Sentry - proximity and battery monitoring appliance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    long_about = "A Raspberry Pi appliance that watches an approach zone with a \
time-of-flight sensor, estimates battery charge, drives a WS2812 LED ring, and \
serves a local web dashboard"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Path to the SQLite database
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    db: String,

    /// Wireless interface used for presence checks and the fallback AP
    #[arg(long, default_value = "wlan0")]
    interface: String,

    /// Run with simulated peripherals (no hardware required)
    #[arg(long)]
    sim: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime loops and web server (default)
    Serve(ServeArgs),

    /// Create or upgrade the database, seed defaults, and exit
    Migrate,
}

#[derive(Args)]
struct ServeArgs {
    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli)?;
    print_banner();

    match &cli.command {
        Some(Commands::Serve(args)) => {
            serve_command(&cli, args).await?;
        }
        Some(Commands::Migrate) => {
            migrate_command(&cli)?;
        }
        None => {
            // Default to serve command
            let serve_args = ServeArgs { no_cors: false };
            serve_command(&cli, &serve_args).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("Pi Sentry - proximity and battery monitor");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("opening database at {}", cli.db);
    let store = Arc::new(Store::open(&cli.db)?);
    let state = Arc::new(SharedState::new());

    let peripherals = build_peripherals(cli, &store)?;
    let network = Arc::clone(&peripherals.network);
    let supervisor = Supervisor::start(Arc::clone(&state), Arc::clone(&store), peripherals);

    let web_config = WebConfig::new(&cli.host, cli.port).with_cors(!args.no_cors);
    info!("web server configuration:");
    info!("  - bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);

    let ctx = Arc::new(ApiContext {
        state,
        store,
        reload: supervisor.reload_signal(),
        network,
    });

    start_web_server(web_config, ctx).await?;
    supervisor.shutdown().await;

    Ok(())
}

fn migrate_command(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(&cli.db)?;
    println!(
        "database ready at {} (schema v{})",
        cli.db,
        store.schema_version()?
    );
    Ok(())
}

fn build_peripherals(
    cli: &Cli,
    store: &Arc<Store>,
) -> Result<Peripherals, Box<dyn std::error::Error>> {
    if cli.sim {
        info!("running with simulated peripherals");
        return Ok(Peripherals::simulated());
    }
    hardware_peripherals(cli, store)
}

#[cfg(feature = "hardware")]
fn hardware_peripherals(
    cli: &Cli,
    store: &Arc<Store>,
) -> Result<Peripherals, Box<dyn std::error::Error>> {
    use pi_sentry::hw::host::HostShutdown;
    use pi_sentry::hw::ina219::{self, Ina219};
    use pi_sentry::hw::neopixel::{NeopixelRing, DEFAULT_PIXELS};
    use pi_sentry::hw::netmgr::NmcliNetwork;
    use pi_sentry::hw::vl53l1x::Vl53l1x;
    use pi_sentry::hw::PowerSensor;
    use pi_sentry::runtime::RangingFactory;
    use pi_sentry::LiveConfig;

    let cfg = LiveConfig::load(store)?;

    // The ranging loop reconstructs the sensor through this factory until
    // it comes up, with the settings current at that moment.
    let ranging: RangingFactory = Box::new(|cfg| {
        let sensor = Vl53l1x::new(cfg.tof.timing_budget_ms, cfg.tof.distance_mode)?;
        Ok(Box::new(sensor))
    });

    let power: Option<Box<dyn PowerSensor>> =
        match Ina219::new(cfg.shunt_ohms, ina219::DEFAULT_ADDRESS) {
            Ok(sensor) => Some(Box::new(sensor)),
            Err(e) => {
                tracing::warn!("power monitor unavailable: {}", e);
                None
            }
        };

    let ring = NeopixelRing::new(DEFAULT_PIXELS, cfg.led.brightness)?;

    Ok(Peripherals {
        ranging,
        power,
        ring: Box::new(ring),
        network: Arc::new(NmcliNetwork::new(cli.interface.clone())),
        critical: Box::new(HostShutdown),
    })
}

#[cfg(not(feature = "hardware"))]
fn hardware_peripherals(
    _cli: &Cli,
    _store: &Arc<Store>,
) -> Result<Peripherals, Box<dyn std::error::Error>> {
    Err("built without the hardware feature; run with --sim or rebuild with --features hardware".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        use clap::Parser;

        let cli = Cli::try_parse_from(["pi_sentry", "--port", "9090", "--sim"]).unwrap();
        assert_eq!(cli.port, 9090);
        assert!(cli.sim);
    }

    #[test]
    fn test_default_values() {
        use clap::Parser;

        let cli = Cli::try_parse_from(["pi_sentry"]).unwrap();
        assert_eq!(cli.port, DEFAULT_WEB_PORT);
        assert_eq!(cli.db, DEFAULT_DB_PATH);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.interface, "wlan0");
        assert!(!cli.sim);
    }
}
