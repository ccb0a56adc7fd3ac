// # fwsyncd - Firewall Sync Daemon
//
// This daemon is a THIN integration layer:
// - DO NOT add reconciliation logic, provider logic, or retry logic here
// - All decisions live in fwsync-core; wire protocols live in provider crates
// - Process configuration is via environment variables ONLY; the operator's
//   settings (credentials, ports, interval) live in the settings store and
//   are edited through the control API
//
// The fwsyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Opening the settings and audit stores
// 3. Registering providers and the IP resolver
// 4. Running the scheduler and the control API until SIGTERM/SIGINT
//
// ## Configuration
//
// - `FWSYNC_DATA_DIR`: directory for `settings.json` and `audit.jsonl` (default `instance`)
// - `FWSYNC_LISTEN_ADDR`: control API bind address (default `127.0.0.1:5000`)
// - `FWSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
// - `FWSYNC_PROVIDER_TIMEOUT_SECS`: provider API timeout, 1-300 (default 20)
// - `FWSYNC_MODE`: `live` or `dry-run` (default `live`)
//
// ## Example
//
// ```bash
// export FWSYNC_DATA_DIR=/var/lib/fwsync
// export FWSYNC_MODE=dry-run
//
// fwsyncd
// curl -X POST http://127.0.0.1:5000/api/run_now
// ```

mod api;

use anyhow::Result;
use fwsync_core::traits::{AuditLog, SettingsStore};
use fwsync_core::{
    ClientOptions, FileAuditLog, FileSettingsStore, ProviderRegistry, Reconciler, Scheduler,
};
use fwsync_ip_http::HttpIpResolver;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long shutdown may wait for the API server and scheduler to stop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FwsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FwsyncExitCode> for ExitCode {
    fn from(code: FwsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Process configuration
#[derive(Debug)]
struct Config {
    data_dir: PathBuf,
    listen_addr: String,
    log_level: String,
    provider_timeout_secs: u64,
    mode: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider_timeout_secs = match lookup("FWSYNC_PROVIDER_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                anyhow::anyhow!(
                    "FWSYNC_PROVIDER_TIMEOUT_SECS must be a whole number of seconds. Got: {}",
                    raw
                )
            })?,
            None => 20,
        };

        Ok(Self {
            data_dir: PathBuf::from(
                lookup("FWSYNC_DATA_DIR").unwrap_or_else(|| "instance".to_string()),
            ),
            listen_addr: lookup("FWSYNC_LISTEN_ADDR")
                .unwrap_or_else(|| "127.0.0.1:5000".to_string()),
            log_level: lookup("FWSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            provider_timeout_secs,
            mode: lookup("FWSYNC_MODE").unwrap_or_else(|| "live".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("FWSYNC_DATA_DIR cannot be empty");
        }

        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!(
                "FWSYNC_LISTEN_ADDR must be an address like 127.0.0.1:5000. Got: {}",
                self.listen_addr
            );
        }

        if !(1..=300).contains(&self.provider_timeout_secs) {
            anyhow::bail!(
                "FWSYNC_PROVIDER_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.provider_timeout_secs
            );
        }

        match self.mode.to_lowercase().as_str() {
            "live" | "dry-run" => {}
            _ => anyhow::bail!(
                "FWSYNC_MODE '{}' is not valid. Valid modes: live, dry-run",
                self.mode
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "FWSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn dry_run(&self) -> bool {
        self.mode.eq_ignore_ascii_case("dry-run")
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            dry_run: self.dry_run(),
            ..ClientOptions::live(Duration::from_secs(self.provider_timeout_secs))
        }
    }

    fn max_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return FwsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return FwsyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.max_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FwsyncExitCode::ConfigError.into();
    }

    info!("Starting fwsyncd daemon");
    if config.dry_run() {
        warn!("DRY-RUN mode: firewall rules will be read but never changed");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FwsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(&config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return FwsyncExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run().await {
            error!("Daemon error: {:#}", e);
            FwsyncExitCode::RuntimeError
        } else {
            FwsyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Everything wired up and bound, ready to serve
struct Daemon {
    listener: TcpListener,
    scheduler: Arc<Scheduler>,
    state: api::AppState,
}

impl Daemon {
    async fn start(config: &Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create data directory {}: {}",
                    config.data_dir.display(),
                    e
                )
            })?;

        let settings_store = FileSettingsStore::open(config.data_dir.join("settings.json")).await?;
        info!("Settings store: {}", settings_store.path().display());
        let settings: Arc<dyn SettingsStore> = Arc::new(settings_store);
        let audit: Arc<dyn AuditLog> =
            Arc::new(FileAuditLog::open(config.data_dir.join("audit.jsonl")).await?);

        #[allow(unused_mut)]
        let mut registry = ProviderRegistry::new();

        #[cfg(feature = "volcengine")]
        {
            info!("Registering Volcengine provider");
            fwsync_provider_volcengine::register(&mut registry, config.client_options());
        }

        #[cfg(feature = "lightsail")]
        {
            info!("Registering Lightsail provider");
            fwsync_provider_lightsail::register(&mut registry, config.client_options());
        }

        if registry.list_providers().is_empty() {
            warn!("No provider features enabled; every run will skip all providers");
        }

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&settings),
            Arc::clone(&audit),
            Arc::new(HttpIpResolver::new()?),
            Arc::new(registry),
        ));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&reconciler), Arc::clone(&settings)));

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", config.listen_addr, e))?;
        info!("Control API listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            scheduler: Arc::clone(&scheduler),
            state: api::AppState {
                reconciler,
                scheduler,
                settings,
                audit,
            },
        })
    }

    async fn run(self) -> Result<()> {
        let (scheduler_stop, scheduler_stop_rx) = oneshot::channel();
        let scheduler = Arc::clone(&self.scheduler);
        let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_stop_rx).await });

        let (server_stop, server_stop_rx) = oneshot::channel::<()>();
        let app = api::router(self.state);
        let listener = self.listener;
        let mut server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = server_stop_rx.await;
                })
                .await
        });

        info!("Daemon initialized successfully");

        tokio::select! {
            signal = wait_for_shutdown() => {
                info!("Received shutdown signal: {}", signal?);
            }
            result = &mut server_task => {
                let _ = scheduler_stop.send(());
                return match result {
                    Ok(Ok(())) => Err(anyhow::anyhow!("Control API stopped unexpectedly")),
                    Ok(Err(e)) => Err(anyhow::anyhow!("Control API failed: {}", e)),
                    Err(e) => Err(anyhow::anyhow!("Control API task panicked: {}", e)),
                };
            }
        }

        info!("Shutting down daemon");
        let _ = server_stop.send(());
        let _ = scheduler_stop.send(());

        // An in-flight run is not cancelled; wait for it within the budget
        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            let server = server_task.await;
            let scheduler = scheduler_task.await;
            (server, scheduler)
        })
        .await;

        match drained {
            Ok((Ok(Ok(())), Ok(()))) => Ok(()),
            Ok((server, scheduler)) => Err(anyhow::anyhow!(
                "Unclean shutdown (server: {:?}, scheduler: {:?})",
                server.map(|r| r.map_err(|e| e.to_string())),
                scheduler
            )),
            Err(_) => Err(anyhow::anyhow!(
                "Shutdown timeout after {:?}",
                SHUTDOWN_TIMEOUT
            )),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("instance"));
        assert_eq!(config.listen_addr, "127.0.0.1:5000");
        assert_eq!(config.provider_timeout_secs, 20);
        assert!(!config.dry_run());
        config.validate().unwrap();
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(config_from(&[("FWSYNC_PROVIDER_TIMEOUT_SECS", "0")])
            .unwrap()
            .validate()
            .is_err());
        assert!(config_from(&[("FWSYNC_PROVIDER_TIMEOUT_SECS", "301")])
            .unwrap()
            .validate()
            .is_err());
        assert!(config_from(&[("FWSYNC_PROVIDER_TIMEOUT_SECS", "soon")]).is_err());

        let config = config_from(&[("FWSYNC_PROVIDER_TIMEOUT_SECS", "300")]).unwrap();
        config.validate().unwrap();
        assert_eq!(config.client_options().timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_dry_run_mode() {
        let config = config_from(&[("FWSYNC_MODE", "DRY-RUN")]).unwrap();
        config.validate().unwrap();
        assert!(config.client_options().dry_run);

        let config = config_from(&[("FWSYNC_MODE", "preview")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_listen_addr_and_log_level() {
        let config = config_from(&[("FWSYNC_LISTEN_ADDR", "localhost")]).unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[("FWSYNC_LOG_LEVEL", "verbose")]).unwrap();
        assert!(config.validate().is_err());
        assert_eq!(
            config_from(&[("FWSYNC_LOG_LEVEL", "DEBUG")]).unwrap().max_level(),
            Level::DEBUG
        );
    }
}
