//! # commitsync
//!
//! Budget-aware synchronization of branch and commit history from a git
//! hosting API (GitHub REST shape) into local storage. Usable as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! commitsync = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use commitsync::budget::Credential;
//! use commitsync::cache::SqliteCache;
//! use commitsync::config::SyncSettings;
//! use commitsync::scheduler::Scheduler;
//! use commitsync::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/commitsync.db")?;
//! store.initialize()?;
//! let cache = SqliteCache::new("./data/budget-cache.db")?;
//!
//! let scheduler = Scheduler::github(
//!     Arc::new(store),
//!     Arc::new(cache),
//!     Credential::from_optional(std::env::var("GITHUB_TOKEN").ok()),
//!     SyncSettings::default(),
//! )?;
//! let report = scheduler.run("project-id", Some("main")).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

pub mod budget;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod hosting;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;
