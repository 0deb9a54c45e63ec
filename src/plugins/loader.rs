//! Plugin discovery and loading.
//!
//! Candidate units are `*.lua` files in the plugin directory. Each unit is
//! executed at most once per registry lifetime, in its own environment
//! table keyed by logical name (the file stem). A unit that defines a
//! `register_plugin(host)` function receives the [`HostFacade`] at load
//! time; units without the symbol are loaded but contribute nothing.

use mlua::{AnyUserData, Function, Lua, RegistryKey};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::host::{HostContext, HostFacade, SharedWidgets, WidgetAction};

/// Failure scoped to a single plugin unit. Never aborts a discovery pass.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read plugin source: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

/// Outcome of one discovery pass
#[derive(Default)]
pub struct LoadReport {
    /// Logical names loaded during this pass, in scan order
    pub loaded: Vec<String>,
    /// Candidates skipped because their name was already registered
    pub skipped: usize,
    /// Per-unit failures, keyed by logical name
    pub errors: Vec<(String, PluginError)>,
}

impl LoadReport {
    /// One-line summary for the status bar, or `None` if nothing happened
    pub fn summary(&self) -> Option<String> {
        if self.loaded.is_empty() && self.errors.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        if !self.loaded.is_empty() {
            parts.push(format!("loaded {}", self.loaded.join(", ")));
        }
        if !self.errors.is_empty() {
            let names: Vec<&str> = self.errors.iter().map(|(name, _)| name.as_str()).collect();
            parts.push(format!("failed {}", names.join(", ")));
        }
        Some(format!("Plugins: {}", parts.join("; ")))
    }
}

/// Discovers and loads plugin units, owning the Lua interpreter they run in.
///
/// The loaded-name map is append-only for the life of the registry; there is
/// no unload operation. Environment tables are pinned in the interpreter
/// registry so plugin state survives garbage collection.
pub struct PluginRegistry {
    lua: Lua,
    plugins_dir: PathBuf,
    loaded: BTreeMap<String, RegistryKey>,
    facade_key: RegistryKey,
    ctx: HostContext,
}

impl PluginRegistry {
    /// Create a registry rooted at `plugins_dir`, building the facade the
    /// plugins will receive.
    pub fn new(plugins_dir: PathBuf, ctx: HostContext) -> Result<Self, PluginError> {
        let lua = Lua::new();
        let facade = lua.create_userdata(HostFacade::new(ctx.clone()))?;
        let facade_key = lua.create_registry_value(facade)?;

        Ok(Self {
            lua,
            plugins_dir,
            loaded: BTreeMap::new(),
            facade_key,
            ctx,
        })
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Check if a logical name has been loaded in this registry's lifetime
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    /// Names of all units ever loaded, sorted
    #[must_use]
    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.keys().map(String::as_str).collect()
    }

    /// Run one discovery pass.
    ///
    /// Ensures the plugin directory exists, enumerates `*.lua` candidates
    /// sorted by file name, and loads every candidate whose logical name has
    /// not been loaded before. A failure in one unit is recorded and the
    /// pass moves on to the next candidate.
    pub fn discover(&mut self) -> LoadReport {
        let mut report = LoadReport::default();

        if let Err(e) = fs::create_dir_all(&self.plugins_dir) {
            warn!(
                "Could not create plugin directory {:?}: {}",
                self.plugins_dir, e
            );
            report
                .errors
                .push((self.plugins_dir.display().to_string(), e.into()));
            return report;
        }

        let mut candidates = match self.scan_candidates() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Could not scan plugin directory: {}", e);
                report
                    .errors
                    .push((self.plugins_dir.display().to_string(), e));
                return report;
            }
        };
        // Filesystem enumeration order is platform-dependent; sort for
        // reproducible load order.
        candidates.sort();

        for path in candidates {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            if self.loaded.contains_key(&name) {
                debug!("Plugin `{}` already loaded, skipping", name);
                report.skipped += 1;
                continue;
            }

            match self.load_unit(&name, &path) {
                Ok(()) => {
                    info!("Loaded plugin `{}` from {:?}", name, path);
                    report.loaded.push(name);
                }
                Err(e) => {
                    warn!("Skipping plugin `{}`: {}", name, e);
                    report.errors.push((name, e));
                }
            }
        }

        report
    }

    fn scan_candidates(&self) -> Result<Vec<PathBuf>, PluginError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.plugins_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "lua") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Load one unit: execute its top-level code in a fresh environment,
    /// then invoke `register_plugin(host)` if the unit defines it.
    ///
    /// The name is recorded only after the whole sequence succeeds, so a
    /// broken unit is retried on the next pass instead of being pinned in a
    /// half-loaded state.
    fn load_unit(&mut self, name: &str, path: &Path) -> Result<(), PluginError> {
        let source = fs::read_to_string(path)?;

        // Isolated per-name environment: reads fall through to the shared
        // globals, writes stay local to the unit.
        let env = self.lua.create_table()?;
        let meta = self.lua.create_table()?;
        meta.set("__index", self.lua.globals())?;
        env.set_metatable(Some(meta));

        self.lua
            .load(&source)
            .set_name(name)
            .set_environment(env.clone())
            .exec()?;

        if let Some(entry) = env.get::<_, Option<Function>>("register_plugin")? {
            let facade: AnyUserData = self.lua.registry_value(&self.facade_key)?;
            *self.ctx.active_unit.borrow_mut() = Some(name.to_string());
            let result = entry.call::<_, ()>(facade);
            *self.ctx.active_unit.borrow_mut() = None;
            result?;
        } else {
            debug!("Plugin `{}` has no register_plugin entry point", name);
        }

        let env_key = self.lua.create_registry_value(env)?;
        self.loaded.insert(name.to_string(), env_key);
        Ok(())
    }

    /// Invoke the Lua callback of a tracked widget, if it has one.
    ///
    /// The widget list borrow is released before the callback runs so the
    /// callback may itself register new widgets.
    pub fn run_widget_action(
        &self,
        widgets: &SharedWidgets,
        index: usize,
    ) -> Result<(), PluginError> {
        let callback = {
            let widgets = widgets.borrow();
            match widgets.get(index).map(|w| &w.action) {
                Some(WidgetAction::Lua(key)) => self.lua.registry_value::<Function>(key)?,
                _ => return Ok(()),
            }
        };
        callback.call::<_, ()>(())?;
        Ok(())
    }
}
