//! # Parley
//!
//! A conversational dispatch engine for chat-style bots.
//!
//! ## Overview
//!
//! Parley turns inbound chat updates into outbound answers. Handlers are
//! plain or `async` functions registered on routes; what they return is
//! rendered, localized and delivered through a platform client you provide.
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌────────────┐     ┌──────────┐
//! │ Platform     │────▶│ Session worker  │────▶│ Dispatcher │────▶│ Handlers │
//! │ client       │     │ (one per chat)  │     │            │     └──────────┘
//! └──────────────┘     └─────────────────┘     └────────────┘          │
//!        ▲                                            │                 │
//!        └──────────────── sent answers ◀─────────────┴─────────────────┘
//! ```
//!
//! - **Route table**: exact texts, `{name:type}` patterns and regexes
//! - **Answers**: text, language keys, media, keyboards and inline queries
//! - **Conversations**: multi-step dialogs that suspend between messages
//! - **Runtime**: configuration, logging, storage and the update loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! async fn times(args: Args) -> Result<String> {
//!     let a: i64 = args.get("a")?;
//!     let b: i64 = args.get("b")?;
//!     Ok(format!("{a} times {b} equals {}", a * b))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::new()
//!         .exact("Hello", || "Hi!")
//!         .pattern("{a:d}x{b:d}", times)
//!         .expect("valid pattern");
//!
//!     let runtime = ParleyRuntime::builder(my_client())
//!         .router(router)
//!         .build()
//!         .unwrap_or_else(|e| std::process::exit(e.exit_code()));
//!     runtime.run().await.ok();
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: Read TOML configuration and language files (default)
//! - `json-log`: Allow `format = "json"` in the `[logging]` section

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use parley_runtime::{ParleyConfig, ParleyRuntime, RuntimeError};

    // Routing, answers and conversations
    pub use parley_framework::prelude::*;

    // Collaborators for custom implementations
    pub use parley_core::{PlatformClient, SessionStore};
}
