//! # Filemgr Daemon Library
//!
//! A sandboxed file manager served over HTTP. Every operation is confined to
//! one configured root directory.
//!
//! ## Overview
//!
//! - **Path Resolution**: references are normalized and checked against the root
//! - **File Operations**: rename, delete, bulk delete, upload and listing
//! - **HTTP Surface**: an axum router with one handler per [`router::Endpoint`]
//!
//! ## Routes
//!
//! ```text
//! GET   /                        home
//! GET   {prefix}/                listing
//! POST  {prefix}/renameFile      rename
//! POST  {prefix}/deleteFile      delete
//! POST  {prefix}/uploadFiles     upload (multipart)
//! POST  {prefix}/bulkDelete      bulk delete
//! ```
//!
//! `{prefix}` is `server.route_prefix`, `/filemanager` by default.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     daemon::server::serve(&config, daemon::server::wait_for_shutdown_signal()).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Path resolution and file operations
//! - [`router`]: Routes and handlers
//! - [`response`]: Outcome to HTTP status translation
//! - [`server`]: Middleware stack and serving

pub mod config;
pub mod files;
pub mod response;
pub mod router;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;
pub use files::{FileError, FileExecutor, PathResolver};
pub use router::{build_router, AppState, Endpoint};
