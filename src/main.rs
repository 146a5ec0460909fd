use anyhow::{Context, Result};
use cia_dashboard::config::LoggingConfig;
use cia_dashboard::{DashboardConfig, DashboardOrchestrator};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "cia-dashboard")]
#[command(about = "Real-time core for the CIA CRM dashboard")]
#[command(version)]
#[command(long_about = "Serves the CIA dashboard API: snapshot loading with a development \
mock fallback, a live event feed relayed over WebSocket, integration credential storage and \
response adaptation for mobile clients.")]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "cia-dashboard.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, help = "Validate configuration file and exit without starting the server")]
    validate_config: bool,

    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[arg(long, help = "Initialize components but don't start them")]
    dry_run: bool,

    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let config = DashboardConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    // Held for the life of the process so buffered file logs are flushed
    let _log_guard = init_logging(&args, &config.logging)?;

    info!("Starting CIA dashboard v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate().context("Invalid configuration")?;

    let mut orchestrator = DashboardOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize dashboard: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start dashboard: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Dashboard error during execution: {}", e);
        e
    })?;

    info!("CIA dashboard exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cia_dashboard={level},tower_http={level}",
            level = log_level
        ))
    });

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &logging.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cia-dashboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    let rendered = toml::to_string_pretty(&DashboardConfig::default())
        .context("Failed to render default configuration")?;

    println!("# CIA dashboard configuration");
    println!("# Every key can be overridden with CIA__<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", rendered);
    Ok(())
}
