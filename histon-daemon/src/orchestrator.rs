//! Module orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `histon-daemon`.
//! It loads configuration, opens the database (when configured), creates
//! the inter-module channel, builds enabled modules, manages startup and
//! shutdown ordering, and runs the main event loop.
//!
//! # Startup Order (producers before consumers)
//!
//! 1. Ingest Pipeline (produces SequencedMessages)
//! 2. Store Writer (consumes SequencedMessages)
//! 3. Export Service (reads the database)
//!
//! # Shutdown Order (same as startup - producers first)
//!
//! 1. Ingest Pipeline (listeners close, spool files sync and close)
//! 2. Store Writer (drain remaining SequencedMessages)
//! 3. Export Service (in-flight requests finish)

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use histon_core::config::HistonConfig;
use histon_store::Db;

use crate::health::{aggregate_status, DaemonHealth, ModuleHealth};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// The main daemon orchestrator.
#[derive(Debug)]
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: HistonConfig,
    /// Registry of all modules (ordered for start/stop).
    registry: ModuleRegistry,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - The database is required but unreachable
    /// - Any enabled module fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = HistonConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when config has already been loaded.
    pub async fn build_from_config(config: HistonConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before module initialization
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        // Open the database when a DSN is configured. A connect failure is
        // fatal only when db.required is set; otherwise the spool stays the
        // durable copy and writers run in drain mode.
        let db = open_database(&config).await?;

        tracing::debug!("creating inter-module channel");
        let (sequenced_tx, sequenced_rx) =
            mpsc::channel(config.ingest.queue_depth.max(1));

        let mut registry = ModuleRegistry::new();

        if let Some(handle) = modules::ingest::init(&config, db.clone(), sequenced_tx)? {
            registry.register(handle);
        }
        registry.register(modules::store::init(&config, db.clone(), sequenced_rx)?);
        if let Some(handle) = modules::export::init(&config, db.clone())? {
            registry.register(handle);
        }

        tracing::info!(total_modules = registry.count(), "orchestrator initialized");

        if config.metrics.enabled {
            metrics::gauge!(histon_core::metrics::DAEMON_MODULES)
                .set(registry.count() as f64);
        }

        Ok(Self {
            config,
            registry,
            start_time: Instant::now(),
        })
    }

    /// Start all enabled modules and enter the main event loop.
    ///
    /// This method blocks until a shutdown signal is received.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        // Write PID file if configured
        if !self.config.general.pid_file.is_empty() {
            let path = Path::new(&self.config.general.pid_file);
            write_pid_file(path)?;
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.registry.start_all().await {
            // Rollback: stop any modules that were successfully started
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.registry.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.remove_pid_file();
            return Err(e);
        }

        // Spawn uptime updater task
        let uptime_task = if self.config.metrics.enabled {
            let start_time = self.start_time;
            let cancel = CancellationToken::new();
            let token = cancel.clone();
            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            metrics::gauge!(histon_core::metrics::DAEMON_UPTIME_SECONDS)
                                .set(start_time.elapsed().as_secs_f64());
                        }
                        _ = token.cancelled() => break,
                    }
                }
            });
            Some((cancel, handle))
        } else {
            None
        };

        // Main event loop
        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, "shutdown signal received");

        if let Some((cancel, handle)) = uptime_task {
            cancel.cancel();
            let _ = handle.await;
        }

        // Stop all modules (producers first)
        let stop_result = self.registry.stop_all().await;

        self.remove_pid_file();

        stop_result
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let statuses = self.registry.health_statuses().await;
        let modules: Vec<ModuleHealth> = statuses
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth {
                name,
                enabled,
                status,
            })
            .collect();

        let status = aggregate_status(&modules);
        DaemonHealth {
            status,
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.registry.count()
    }

    fn remove_pid_file(&self) {
        if !self.config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&self.config.general.pid_file));
        }
    }
}

async fn open_database(config: &HistonConfig) -> Result<Option<Arc<Db>>> {
    let dsn = config.db.postgres_dsn.trim();
    if dsn.is_empty() {
        if config.db.required {
            return Err(anyhow::anyhow!("db required but postgres_dsn not set"));
        }
        tracing::warn!("no database configured, ingestion will spool only");
        return Ok(None);
    }

    match Db::open(dsn).await {
        Ok(db) => {
            if let Err(e) = db.ensure_schema().await {
                if config.db.required {
                    return Err(anyhow::anyhow!("ensure schema failed (required): {}", e));
                }
                tracing::warn!(error = %e, "ensure schema failed");
            }
            // Seed config-defined tenants so inserts satisfy the FK
            for tenant in &config.tenant {
                if let Err(e) = db.ensure_tenant(&tenant.id, &tenant.name).await {
                    tracing::warn!(tenant = %tenant.id, error = %e, "ensure tenant failed");
                }
            }
            tracing::info!("database connected");
            Ok(Some(Arc::new(db)))
        }
        Err(e) => {
            if config.db.required {
                return Err(anyhow::anyhow!("db connect failed (required): {}", e));
            }
            tracing::warn!(error = %e, "db connect failed, ingestion will spool but inserts are disabled");
            Ok(None)
        }
    }
}

/// Wait for SIGINT or SIGTERM. Returns the signal name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| anyhow::anyhow!("failed to wait for SIGINT: {}", e))?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| anyhow::anyhow!("failed to wait for ctrl-c: {}", e))?;
        Ok("SIGINT")
    }
}

/// Write the daemon PID file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file (prevents TOCTOU races)
/// - Verifies the created file is a regular file (prevents symlink attacks)
/// - Creates the parent directory with restrictive permissions (0o700)
///
/// # Errors
///
/// Returns an error if the PID file cannot be written or another
/// instance already owns it.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    // Create parent directory with restrictive permissions (0o700)
    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    // Atomically create file only if it doesn't exist (eliminates TOCTOU race)
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // File already exists, read the existing PID for the error message
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    // Verify the created file is a regular file (not a symlink or other special file)
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        // Remove the non-regular file and return error
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    // Set restrictive permissions on the PID file (0o600)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        file.set_permissions(permissions)?;
    }

    writeln!(file, "{pid}")?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("histon.pid");
        write_pid_file(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        remove_pid_file(&path);
        assert!(!path.exists());
    }

    #[test]
    fn pid_file_detects_existing_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("histon.pid");
        std::fs::write(&path, "12345\n").unwrap();

        let err = write_pid_file(&path).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("already exists"));
        assert!(message.contains("12345"));
        // The existing file must not be clobbered
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "12345");
    }

    #[test]
    fn pid_file_creates_missing_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("histon.pid");
        write_pid_file(&path).unwrap();
        assert!(path.exists());
        remove_pid_file(&path);
    }

    #[cfg(unix)]
    #[test]
    fn pid_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("histon.pid");
        write_pid_file(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        remove_pid_file(&path);
    }
}
