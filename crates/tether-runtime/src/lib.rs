//! # Tether Runtime
//!
//! The ambient layer around the tether crates:
//!
//! - Layered configuration ([`config`]) over figment, from defaults, files,
//!   `TETHER_*` environment variables and programmatic merges.
//! - Logging setup ([`logging`]) over `tracing-subscriber`.
//! - [`TetherRuntime`], which initializes both and serves APIs over the
//!   loopback transport.
//!
//! ```ignore
//! use tether_runtime::TetherRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = TetherRuntime::builder().profile("production").build()?;
//!     let client = runtime.serve_object(root, handlers, BindingKind::Normal)?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, TetherConfig, TransportConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, TetherRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
