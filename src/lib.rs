//! Tabula - an extensible terminal record browser
//!
//! This library provides the core functionality for the Tabula record
//! browser, including the persistence adapter, the plugin registry, and the
//! tabular UI bound to the local store.
//!
//! # Modules
//!
//! - [`config`]: Configuration management and first-run defaults
//! - [`store`]: Persistence adapter owning the backend connection
//! - [`plugins`]: Plugin discovery, loading, and the host facade
//! - [`browser`]: Main event loop and the record store view

pub mod browser;
pub mod config;
pub mod plugins;
pub mod store;
