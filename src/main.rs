// cpuproc - version 0.1.0
// Host and per-process CPU utilization with tracing logging
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};

use cpuproc::config::{load_config, validate_effective_config, Config};

mod cli;
mod commands;
mod state;

use cli::{Args, Commands};
use state::AppState;

/// Resolves configuration from CLI args, config file, and defaults.
/// Precedence: CLI (if provided) > config file > default.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(v) = &args.proc_root {
        config.proc_root = Some(v.clone());
    }
    if let Some(v) = &args.etc_root {
        config.etc_root = Some(v.clone());
    }
    if let Some(v) = &args.host_root {
        config.host_root = Some(v.clone());
    }
    if let Some(ticks) = args.clock_ticks {
        config.clock_ticks = Some(ticks);
    }
    if args.no_boot_time_cache {
        config.boot_time_cache = Some(false);
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(format!("{:?}", level).to_lowercase());
    }

    Ok(config)
}

fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) {
    let name = config.log_level.as_deref().unwrap_or("info");
    if name.eq_ignore_ascii_case("off") {
        return;
    }
    let log_level = parse_level(name).unwrap_or(Level::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    debug!("Logging initialized with level: {}", name);
}

/// Cancels `token` on SIGINT or SIGTERM.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut s) => {
                    s.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), cancelling sampling");
            }
            _ = terminate => {
                info!("Received SIGTERM, cancelling sampling");
            }
        }
        token.cancel();
    });
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        println!("{}", commands::config::render_config(&config, args.config_format)?);
        return Ok(());
    }

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config);

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let command = args.command.unwrap_or(Commands::Total {
        interval_ms: None,
        count: None,
    });

    let state = AppState::new(config, cancel);
    debug!("Application state initialized");

    match command {
        Commands::Total { interval_ms, count } => {
            commands::command_percent(&state, false, interval_ms, count).await
        }
        Commands::PerCpu { interval_ms, count } => {
            commands::command_percent(&state, true, interval_ms, count).await
        }
        Commands::Times { per_cpu, format } => commands::command_times(&state, per_cpu, format),
        Commands::Process {
            pid,
            tid,
            count,
            interval_ms,
            format,
        } => commands::command_process(&state, pid, tid, count, interval_ms, format).await,
        Commands::Host { format } => commands::command_host(&state, format),
        Commands::Check => commands::command_check(&state),
        Commands::Config { output, format } => commands::command_config(output, format),
    }
}
