// src/main.rs
//! GPS Autodetect - find a serial GPS receiver and serve its position

use anyhow::Context;
use clap::Parser;
use gps_autodetect::{
    acquire::Acquisition,
    config::GpsConfig,
    device::{
        probe::{Acquired, CandidateProbe, Outcome, Prober, Rejection, SerialOpener},
        DevicePath,
    },
    discovery::{self, enumeration::EnumerationSource, sysfs::SysfsEnumerator, MatchRule},
    display::{self, terminal::TerminalDisplay},
    monitor::{self, MonitorSession, SessionEnd},
    status, GpsError, SharedState,
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "gps-autodetect", version, about)]
struct Cli {
    /// GPS device to read when not autodetecting
    #[arg(short, long, value_name = "PATH")]
    input: Option<String>,

    /// Search attached and hot-plugged serial devices for a GPS receiver
    #[arg(short, long)]
    autodetect: bool,

    /// Longest wait for one sentence from the device
    #[arg(short, long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Overall limit for finding a device in autodetect mode
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    autodetect_timeout: Option<Duration>,

    /// Limit for confirming a single candidate
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    probe_timeout: Option<Duration>,

    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Device name pattern for autodetection, e.g. 'ttyUSB\d+'
    #[arg(long, value_name = "REGEX")]
    pattern: Option<String>,

    /// Address of the JSON status endpoint
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Configuration file (default: ~/.config/gps-autodetect/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show a live terminal view of the GPS state
    #[arg(short, long)]
    display: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

impl Cli {
    /// Where logs go; the terminal view owns the screen, so it implies a file
    fn log_destination(&self) -> Option<PathBuf> {
        self.log_file.clone().or_else(|| {
            self.display
                .then(|| std::env::temp_dir().join("gps-autodetect.log"))
        })
    }

    fn load_config(&self) -> gps_autodetect::Result<GpsConfig> {
        let mut config = match &self.config {
            Some(path) => GpsConfig::load_from(path)?,
            None => GpsConfig::load()?,
        };

        if let Some(input) = &self.input {
            config.device_path = input.clone();
        }
        if self.autodetect {
            config.autodetect = true;
        }
        if let Some(timeout) = self.timeout {
            config.set_read_timeout(timeout);
        }
        if let Some(timeout) = self.autodetect_timeout {
            config.set_autodetect_timeout(timeout);
        }
        if let Some(timeout) = self.probe_timeout {
            config.set_probe_timeout(timeout);
        }
        if let Some(baudrate) = self.baudrate {
            config.baudrate = baudrate;
        }
        if let Some(pattern) = &self.pattern {
            config.device_pattern = pattern.clone();
        }
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.list_ports {
        monitor::list_serial_ports().context("Failed to list serial ports")?;
        return Ok(());
    }

    let config = cli.load_config().context("Failed to load configuration")?;
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let state = SharedState::new();
    let prober: Arc<dyn Prober> = Arc::new(CandidateProbe::new(SerialOpener {
        baudrate: config.baudrate,
    }));

    let acquired = match acquire(&config, &prober, &shutdown).await {
        Err(e) if is_cancelled(&e) => return Ok(()),
        result => result?,
    };

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind status endpoint on {}", config.listen_addr))?;
    let server = tokio::spawn(status::serve(listener, state.clone(), shutdown.clone()));

    let view = (cli.display && display::is_interactive()).then(|| {
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { TerminalDisplay::new().run(state, shutdown).await })
    });

    let result = monitor_loop(acquired, &config, &prober, &state, &shutdown).await;

    shutdown.cancel();
    match server.await {
        Ok(Err(e)) => warn!(error = %e, "status endpoint failed"),
        Err(e) => warn!(error = %e, "status endpoint task panicked"),
        Ok(Ok(())) => {}
    }
    if let Some(view) = view {
        if let Ok(Err(e)) = view.await {
            warn!(error = %e, "terminal view failed");
        }
    }

    result
}

/// Monitor devices one after another until shutdown, or until the device
/// goes away when it was given explicitly
async fn monitor_loop(
    mut acquired: Acquired,
    config: &GpsConfig,
    prober: &Arc<dyn Prober>,
    state: &SharedState,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let session = MonitorSession::new(acquired, config.read_timeout(), state.clone());
        let end = session
            .run(discovery::hotplug_source(), shutdown.clone())
            .await
            .context("Monitoring session failed")?;

        match end {
            SessionEnd::Shutdown => return Ok(()),
            SessionEnd::DeviceRemoved if config.autodetect => {
                info!("searching for a replacement GPS device");
                state.update(|s| s.device = None);
                acquired = match acquire(config, prober, shutdown).await {
                    Err(e) if is_cancelled(&e) => return Ok(()),
                    result => result?,
                };
            }
            SessionEnd::DeviceRemoved => {
                info!(device = %config.device_path, "GPS device removed, exiting");
                return Ok(());
            }
        }
    }
}

async fn acquire(
    config: &GpsConfig,
    prober: &Arc<dyn Prober>,
    shutdown: &CancellationToken,
) -> anyhow::Result<Acquired> {
    if !config.autodetect {
        return probe_explicit(config, prober, shutdown).await;
    }

    info!(
        pattern = %config.device_pattern,
        timeout = %humantime::format_duration(config.autodetect_timeout()),
        "autodetecting GPS device"
    );
    let rule = MatchRule::attached(&config.device_pattern)?;
    let acquisition = Acquisition::new(Arc::clone(prober), config.probe_timeout())
        .with_source(Arc::new(EnumerationSource::new(SysfsEnumerator::new(
            &config.sysfs_root,
        ))))
        .with_source(discovery::hotplug_source());

    let acquired = acquisition
        .run(&rule, config.autodetect_timeout(), shutdown)
        .await?;
    Ok(acquired)
}

/// Confirm the configured device, bounded by the read timeout
async fn probe_explicit(
    config: &GpsConfig,
    prober: &Arc<dyn Prober>,
    shutdown: &CancellationToken,
) -> anyhow::Result<Acquired> {
    let path = DevicePath::resolve(&config.device_path);
    info!(device = %path, "opening GPS device");

    let deadline = Instant::now() + config.read_timeout();
    match prober.probe(path, deadline, shutdown.child_token()).await {
        Outcome::Confirmed(acquired) => Ok(acquired),
        Outcome::Rejected {
            reason: Rejection::Cancelled,
            ..
        } => Err(GpsError::Cancelled.into()),
        Outcome::Rejected { path, reason } => Err(GpsError::NotGps {
            path: path.to_string(),
            reason: reason.to_string(),
        }
        .into()),
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "gps_autodetect=info".into()),
    );

    match cli.log_destination() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

fn is_cancelled(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<GpsError>(), Some(GpsError::Cancelled))
}

/// Cancel `shutdown` on SIGINT, SIGTERM or SIGQUIT
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut term, mut quit) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::quit()),
        ) {
            (Ok(term), Ok(quit)) => (term, quit),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "unable to install signal handlers, only Ctrl+C will stop");
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.cancel();
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            _ = term.recv() => info!("terminate signal received"),
            _ = quit.recv() => info!("quit signal received"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to listen for Ctrl+C");
            return;
        }
        info!("interrupt received");
    }

    shutdown.cancel();
}
