//! Parley Runtime - running a parley bot as a process.
//!
//! This crate provides:
//! - Configuration loading from TOML files and the environment (`config`)
//! - Logging setup on top of `tracing-subscriber` (`logging`)
//! - A JSON file session store (`JsonFileStore`)
//! - One ordered worker per chat (`SessionRegistry`)
//! - The update loop with startup and termination hooks (`ParleyRuntime`)
//!
//! ```ignore
//! use parley_runtime::ParleyRuntime;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(MyPlatformClient::connect().await);
//!     let runtime = match ParleyRuntime::builder(client).router(router()).build() {
//!         Ok(runtime) => runtime,
//!         Err(e) => {
//!             eprintln!("{e}");
//!             std::process::exit(e.exit_code());
//!         }
//!     };
//!     if let Err(e) = runtime.run().await {
//!         std::process::exit(e.exit_code());
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod runtime;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, GeneralConfig, ParleyConfig, QueryConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use registry::{RegistryStats, SessionRegistry};
pub use runtime::{ParleyRuntime, RuntimeBuilder, shutdown_signal};
pub use storage::JsonFileStore;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
