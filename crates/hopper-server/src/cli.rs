//! CLI entry point: argument parsing, log setup, signal wiring.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::audit::AUDIT_TARGET;
use crate::runtime::Router;
use hopper_config::load_config;

/// hopper CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "hopper", version, about = "Rule-routed TCP proxy multiplexer")]
pub struct ServerArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Append diagnostics to this file instead of stderr
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Append audit lines to this file instead of stdout
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Suppress audit lines entirely
    #[arg(long)]
    pub no_audit: bool,

    /// Log debug diagnostics
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Runs the router until a shutdown signal arrives.
///
/// A missing or invalid configuration file at startup is fatal; after
/// startup, SIGHUP reloads and a rejected candidate keeps the previous
/// configuration.
pub async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&args)?;

    let config = load_config(&args.config)?;

    let shutdown = CancellationToken::new();
    let router = Arc::new(Router::new(shutdown.clone()));

    let pid = std::process::id();
    info!(pid, "hopper starting; reload configuration with: kill -HUP {pid}");

    router.apply(&config).await?;

    #[cfg(unix)]
    {
        let config_path = args.config.clone();
        let router = router.clone();
        tokio::spawn(async move {
            reload_signal_handler(config_path, router).await;
        });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal_handler().await;
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    shutdown.cancelled().await;
    router.shutdown().await;
    info!("all listeners stopped");
    Ok(())
}

/// Waits for SIGTERM or Ctrl+C.
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Reloads the configuration on each SIGHUP (Unix only).
#[cfg(unix)]
async fn reload_signal_handler(config_path: PathBuf, router: Arc<Router>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("failed to install SIGHUP handler: {}, reload disabled", e);
            return;
        }
    };

    loop {
        sighup.recv().await;
        info!("SIGHUP received, reloading configuration");

        let config = match load_config(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "reload failed, keeping previous configuration");
                continue;
            }
        };
        match router.apply(&config).await {
            Ok(()) => info!("configuration reloaded"),
            Err(e) => warn!(error = %e, "reload rejected, keeping previous configuration"),
        }
    }
}

/// Sets up two log streams: diagnostics (level-filtered) and the audit
/// trail, each with its own optional file sink.
fn init_tracing(args: &ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    let diag_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let open_append = |path: &PathBuf| -> Result<Arc<std::fs::File>, std::io::Error> {
        Ok(Arc::new(
            OpenOptions::new().append(true).create(true).open(path)?,
        ))
    };

    let diag_writer = match &args.log {
        Some(path) => BoxMakeWriter::new(open_append(path)?),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let diag_layer = fmt::layer()
        .with_writer(diag_writer)
        .with_ansi(args.log.is_none())
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET))
        .with_filter(diag_filter);

    let audit_layer = if args.no_audit {
        None
    } else {
        let audit_writer = match &args.audit_log {
            Some(path) => BoxMakeWriter::new(open_append(path)?),
            None => BoxMakeWriter::new(std::io::stdout),
        };
        Some(
            fmt::layer()
                .with_writer(audit_writer)
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET)),
        )
    };

    tracing_subscriber::registry()
        .with(diag_layer)
        .with(audit_layer)
        .init();
    Ok(())
}
