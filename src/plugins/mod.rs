//! Plugin system: runtime-discovered Lua units extending the browser.
//!
//! - [`loader`]: directory discovery, at-most-once loading, per-unit
//!   failure boundaries
//! - [`host`]: the facade and widget bookkeeping handed to plugin code

pub mod host;
pub mod loader;

pub use host::{HostContext, HostFacade, SharedWidgets, TrackedWidget, WidgetAction};
pub use loader::{LoadReport, PluginError, PluginRegistry};
