//! Runtime orchestration: configuration, logging and served APIs.
//!
//! ```rust,ignore
//! use tether_runtime::TetherRuntime;
//!
//! let runtime = TetherRuntime::builder()
//!     .config_file("config/tether.toml")
//!     .build()?;
//!
//! let client = runtime.serve(Api::new(root));
//! let users = client.route("users").close(()).await?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::signal;
use tracing::{debug, info, warn};

use tether_api::{Api, Client};
use tether_core::{Binding, BindingKind, Handlers, Value};
use tether_transport::{ServerHandle, serve};

use crate::config::{ConfigLoader, ConfigResult, TetherConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// Owns the configuration and every API served through it.
///
/// Servers run on the loopback transport with the configured timeout and
/// channel capacity, and are stopped by [`shutdown`](Self::shutdown) or when
/// the runtime is dropped.
pub struct TetherRuntime {
    config: TetherConfig,
    servers: Mutex<Vec<ServerHandle>>,
    running: AtomicBool,
}

impl TetherRuntime {
    /// Creates a runtime from the configuration found in the current
    /// directory, falling back to defaults.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                TetherConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration, initializing logging.
    pub fn from_config(config: &TetherConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            request_timeout_ms = config.transport.request_timeout_ms,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            servers: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of servers started and not yet shut down.
    pub fn server_count(&self) -> usize {
        self.servers.lock().len()
    }

    /// Serves `api` over the loopback transport and returns a client of it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn serve(&self, api: Api) -> Client {
        let (protocol, handle) = serve(api, self.config.transport.to_loopback_config());
        let mut servers = self.servers.lock();
        servers.push(handle);
        debug!(servers = servers.len(), "Serving api");
        Client::new(protocol)
    }

    /// Binds `target` and serves it.
    pub fn serve_object(
        &self,
        target: impl Into<Value>,
        handlers: Handlers,
        kind: BindingKind,
    ) -> RuntimeResult<Client> {
        let root = Binding::bind(target.into(), handlers, kind)?;
        Ok(self.serve(Api::new(root)))
    }

    /// Stops every server. Clients observe a disconnect.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Runtime is not running");
        }

        let servers = std::mem::take(&mut *self.servers.lock());
        info!(servers = servers.len(), "Stopping tether runtime");
        for server in servers {
            server.shutdown().await;
        }
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Tether runtime is now running. Press Ctrl+C to stop.");
        let result = wait_for_shutdown().await;
        self.shutdown().await;
        result
    }

    /// Runs until `shutdown` completes, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown().await;
    }
}

impl Default for TetherRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`TetherRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: TetherConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self) -> ConfigResult<TetherRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(TetherRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tether_core::{ErrorKind, Object, State};

    use super::*;
    use crate::config::ConfigError;

    fn echo_handlers() -> Handlers {
        Handlers::new()
            .router(|state: State, _destination: Value| async move { state.value() })
            .closer(|state: State, data: Value| async move {
                format!("{}:{data}", state.path())
            })
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let runtime = TetherRuntime::from_config(&TetherConfig::default());
        let client = runtime
            .serve_object(Object::plain(), echo_handlers(), BindingKind::Normal)
            .unwrap();
        assert_eq!(runtime.server_count(), 1);
        assert!(client.connected());

        let value = client.route("a").route("b").close("x").await.unwrap();
        assert_eq!(value, Value::from("a/b:x"));

        runtime.shutdown().await;
        assert!(!runtime.is_running());
        assert_eq!(runtime.server_count(), 0);

        client
            .watch()
            .wait_for(|connected| !connected)
            .await
            .unwrap();
        let err = client.close(()).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Disconnected));
    }

    #[tokio::test]
    async fn test_serve_object_rejects_primitives() {
        let runtime = TetherRuntime::from_config(&TetherConfig::default());
        let result = runtime.serve_object(5, echo_handlers(), BindingKind::Normal);
        assert!(matches!(result, Err(crate::RuntimeError::Bind(_))));
        assert_eq!(runtime.server_count(), 0);
    }

    #[tokio::test]
    async fn test_run_until() {
        let runtime = TetherRuntime::from_config(&TetherConfig::default());
        let client = runtime.serve(Api::new({
            let root = Object::plain();
            Binding::bind(Value::from(&root), echo_handlers(), BindingKind::Normal).unwrap();
            root
        }));

        runtime.run_until(async {}).await;
        client
            .watch()
            .wait_for(|connected| !connected)
            .await
            .unwrap();
    }

    #[test]
    fn test_builder_validates() {
        let mut config = TetherConfig::default();
        config.transport.channel_capacity = 0;

        let result = TetherRuntime::builder().without_env().merge(config).build();
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_builder_applies_merges() {
        let mut config = TetherConfig::default();
        config.transport.request_timeout_ms = 1500;

        let runtime = TetherRuntime::builder()
            .without_env()
            .merge(config)
            .build()
            .unwrap();
        assert_eq!(runtime.config().transport.request_timeout_ms, 1500);
    }
}
