//! Plugin lifecycle management
//!
//! ```text
//! Discovered → Validated → Initialized → Enabled ⇄ Disabled → ShutDown
//!                 └──────────────┴──────────→ Failed
//! ```
//!
//! Plugin errors never abort a load or shutdown sequence. They are recorded
//! on the failing plugin's metadata and the sequence moves on.

use crate::error::{EngineError, EngineResult, require_non_empty};
use crate::plugins::{
    PluginHandle, PluginMetadata, PluginSource, PluginState, ServiceContext,
};
use chrono::Utc;
use indexmap::IndexMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct PluginEntry {
    plugin: PluginHandle,
    metadata: PluginMetadata,
}

impl PluginEntry {
    /// Run the plugin's self-check. A non-blank reason fails the plugin.
    fn validate(&mut self) -> bool {
        match self.plugin.validate() {
            Some(reason) if !reason.trim().is_empty() => {
                self.fail(format!("validation failed: {reason}"));
                false
            }
            _ => {
                self.metadata.state = PluginState::Validated;
                true
            }
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(plugin = %self.metadata.name, error = %message, "plugin failed");
        self.metadata.state = PluginState::Failed;
        self.metadata.last_error = Some(message);
    }
}

/// Outcome of `PluginManager::shutdown_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Plugins shut down, in shutdown order
    pub shut_down: Vec<String>,
    /// `(plugin, message)` for every shutdown that reported an error
    pub errors: Vec<(String, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct PluginManager {
    source: Box<dyn PluginSource>,
    services: ServiceContext,
    entries: IndexMap<String, PluginEntry>,
    init_order: Vec<String>,
    plugins_to_load: Vec<String>,
    plugins_to_exclude: Vec<String>,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
}

impl PluginManager {
    pub fn new(source: impl PluginSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            services: ServiceContext::new(),
            entries: IndexMap::new(),
            init_order: Vec::new(),
            plugins_to_load: Vec::new(),
            plugins_to_exclude: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_services(mut self, services: ServiceContext) -> Self {
        self.services = services;
        self
    }

    /// Restrict discovery. A non-empty `load` list is an allow-list;
    /// `exclude` always wins. Names compare case-insensitively.
    pub fn with_filter(mut self, load: Vec<String>, exclude: Vec<String>) -> Self {
        self.plugins_to_load = load;
        self.plugins_to_exclude = exclude;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn services(&self) -> &ServiceContext {
        &self.services
    }

    fn admits(&self, name: &str) -> bool {
        let listed = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(name));
        if listed(&self.plugins_to_exclude) {
            return false;
        }
        self.plugins_to_load.is_empty() || listed(&self.plugins_to_load)
    }

    /// Discover, validate and initialize the plugins found in `directory`.
    ///
    /// Returns the number of plugins that reached `Enabled` during this call.
    /// Only cancellation and discovery failures are returned as errors.
    pub async fn load_and_initialize(&mut self, directory: &Path) -> EngineResult<usize> {
        let discovered = self.source.discover(directory)?;
        info!(
            directory = %directory.display(),
            candidates = discovered.len(),
            "loading plugins"
        );

        let mut batch = Vec::new();
        for plugin in discovered {
            let name = plugin.name().to_string();
            if name.trim().is_empty() {
                warn!("skipping plugin with an empty name");
                continue;
            }
            if !self.admits(&name) {
                debug!(plugin = %name, "plugin filtered out by configuration");
                continue;
            }
            if self.entries.contains_key(&name) {
                warn!(plugin = %name, "plugin already loaded, skipping duplicate");
                continue;
            }
            let metadata = PluginMetadata::from_plugin(plugin.as_ref());
            debug!(plugin = %name, version = %metadata.version, "plugin discovered");
            self.entries.insert(name.clone(), PluginEntry { plugin, metadata });
            batch.push(name);
        }

        self.validate_batch(&batch);
        self.check_dependencies(&batch);
        let order = self.initialization_order_for(&batch);

        let mut enabled = 0;
        for name in order {
            if self.initialize_entry(&name).await? {
                enabled += 1;
            }
        }

        info!(
            enabled,
            failed = batch
                .iter()
                .filter(|name| self.state_of(name) == Some(PluginState::Failed))
                .count(),
            "plugins loaded"
        );
        Ok(enabled)
    }

    fn validate_batch(&mut self, batch: &[String]) {
        for name in batch {
            let Some(entry) = self.entries.get_mut(name) else {
                continue;
            };
            entry.validate();
        }
    }

    /// Fail every validated plugin whose dependencies are unknown or failed,
    /// repeating until no further plugin is blocked.
    fn check_dependencies(&mut self, batch: &[String]) {
        loop {
            let mut blocked = Vec::new();
            for name in batch {
                let Some(entry) = self.entries.get(name) else {
                    continue;
                };
                if entry.metadata.state != PluginState::Validated {
                    continue;
                }
                for dependency in &entry.metadata.dependencies {
                    let reason = match self.state_of(dependency) {
                        None => Some(format!("missing dependency '{dependency}'")),
                        Some(PluginState::Failed) | Some(PluginState::ShutDown) => {
                            Some(format!("dependency '{dependency}' failed"))
                        }
                        Some(_) => None,
                    };
                    if let Some(reason) = reason {
                        blocked.push((name.clone(), reason));
                        break;
                    }
                }
            }

            if blocked.is_empty() {
                return;
            }
            for (name, reason) in blocked {
                if let Some(entry) = self.entries.get_mut(&name) {
                    entry.fail(reason);
                }
            }
        }
    }

    /// Dependencies first, discovery order otherwise. Plugins left over form
    /// a cycle and are failed.
    fn initialization_order_for(&mut self, batch: &[String]) -> Vec<String> {
        let mut pending: Vec<String> = batch
            .iter()
            .filter(|name| self.state_of(name) == Some(PluginState::Validated))
            .cloned()
            .collect();
        let mut order = Vec::with_capacity(pending.len());

        loop {
            let ready = pending.iter().position(|name| {
                self.entries.get(name).is_some_and(|entry| {
                    entry
                        .metadata
                        .dependencies
                        .iter()
                        .all(|dependency| !pending.contains(dependency))
                })
            });
            match ready {
                Some(index) => order.push(pending.remove(index)),
                None => break,
            }
        }

        if !pending.is_empty() {
            error!(plugins = ?pending, "plugin dependency cycle detected");
            for name in &pending {
                if let Some(entry) = self.entries.get_mut(name) {
                    entry.fail("dependency cycle");
                }
            }
        }
        order
    }

    /// Returns `Ok(true)` when the plugin ended up enabled.
    async fn initialize_entry(&mut self, name: &str) -> EngineResult<bool> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(false);
        };
        let plugin = entry.plugin.clone();

        let unmet = entry.metadata.dependencies.iter().find(|dependency| {
            !self
                .state_of(dependency)
                .is_some_and(|state| state.is_initialized())
        });
        if let Some(dependency) = unmet.cloned() {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.fail(format!("dependency '{dependency}' failed"));
            }
            return Ok(false);
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(EngineError::Cancelled { operation: "plugin initialization" });
            }
            result = plugin.initialize(&self.services, self.cancel.child_token()) => result,
        };

        let Some(entry) = self.entries.get_mut(name) else {
            return Ok(false);
        };
        match result {
            Ok(()) => {
                entry.metadata.state = PluginState::Initialized;
                entry.metadata.initialized_at = Some(Utc::now());
                entry.metadata.last_error = None;
                debug!(plugin = %name, "plugin initialized");
                entry.metadata.state = PluginState::Enabled;
                info!(plugin = %name, version = %entry.metadata.version, "plugin enabled");
                self.init_order.push(name.to_string());
                Ok(true)
            }
            Err(e) => {
                entry.fail(format!("initialization failed: {e:#}"));
                Ok(false)
            }
        }
    }

    fn state_of(&self, name: &str) -> Option<PluginState> {
        self.entries.get(name).map(|entry| entry.metadata.state)
    }

    fn entry_mut(&mut self, name: &str) -> EngineResult<&mut PluginEntry> {
        require_non_empty("name", name)?;
        self.entries
            .get_mut(name)
            .ok_or_else(|| EngineError::PluginNotFound {
                name: name.to_string(),
            })
    }

    /// Initialize a loaded plugin that is not yet initialized, e.g. after a
    /// failed first attempt. The self-check runs again first.
    pub async fn initialize(&mut self, name: &str) -> EngineResult<()> {
        let entry = self.entry_mut(name)?;
        match entry.metadata.state {
            state if state.is_initialized() => {
                return Err(EngineError::PluginAlreadyInitialized {
                    name: name.to_string(),
                });
            }
            PluginState::ShutDown => {
                return Err(EngineError::PluginFailed {
                    name: name.to_string(),
                    message: "plugin has been shut down".to_string(),
                });
            }
            _ => {}
        }

        if !entry.validate() {
            let message = entry
                .metadata
                .last_error
                .clone()
                .unwrap_or_else(|| "validation failed".to_string());
            return Err(EngineError::PluginFailed {
                name: name.to_string(),
                message,
            });
        }

        if self.initialize_entry(name).await? {
            return Ok(());
        }
        let message = self
            .plugin(name)
            .and_then(|metadata| metadata.last_error.clone())
            .unwrap_or_else(|| "initialization failed".to_string());
        Err(EngineError::PluginFailed {
            name: name.to_string(),
            message,
        })
    }

    /// Make an initialized plugin available. Enabling an enabled plugin is a
    /// no-op.
    pub async fn enable(&mut self, name: &str) -> EngineResult<()> {
        self.transition(name, PluginState::Enabled)
    }

    /// Withdraw an initialized plugin without shutting it down. Disabling a
    /// disabled plugin is a no-op.
    pub async fn disable(&mut self, name: &str) -> EngineResult<()> {
        self.transition(name, PluginState::Disabled)
    }

    fn transition(&mut self, name: &str, target: PluginState) -> EngineResult<()> {
        let entry = self.entry_mut(name)?;
        let current = entry.metadata.state;
        if current == target {
            debug!(plugin = %name, state = %target, "plugin already in requested state");
            return Ok(());
        }
        if !current.is_initialized() {
            return Err(EngineError::PluginFailed {
                name: name.to_string(),
                message: format!("plugin is not initialized (state: {current})"),
            });
        }
        entry.metadata.state = target;
        info!(plugin = %name, from = %current, to = %target, "plugin state changed");
        Ok(())
    }

    /// Shut down every initialized plugin in reverse initialization order.
    /// Individual failures are collected, never propagated.
    pub async fn shutdown_all(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let order: Vec<String> = self.init_order.drain(..).rev().collect();

        for name in order {
            let Some(entry) = self.entries.get_mut(&name) else {
                continue;
            };
            if !entry.metadata.state.is_initialized() {
                continue;
            }
            let plugin = entry.plugin.clone();
            let outcome = timeout(
                self.shutdown_timeout,
                plugin.shutdown(self.cancel.child_token()),
            )
            .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("shutdown failed: {e:#}")),
                Err(_) => Some(format!(
                    "shutdown timed out after {:?}",
                    self.shutdown_timeout
                )),
            };

            entry.metadata.state = PluginState::ShutDown;
            match failure {
                Some(message) => {
                    error!(plugin = %name, error = %message, "plugin shutdown failed");
                    entry.metadata.last_error = Some(message.clone());
                    report.errors.push((name.clone(), message));
                }
                None => debug!(plugin = %name, "plugin shut down"),
            }
            report.shut_down.push(name);
        }

        info!(
            shut_down = report.shut_down.len(),
            errors = report.errors.len(),
            "plugin shutdown complete"
        );
        report
    }

    /// Metadata of every loaded plugin, in discovery order.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginMetadata> {
        self.entries.values().map(|entry| &entry.metadata)
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginMetadata> {
        self.entries.get(name).map(|entry| &entry.metadata)
    }

    /// Handle of an enabled plugin.
    pub fn get_plugin(&self, name: &str) -> Option<PluginHandle> {
        self.entries
            .get(name)
            .filter(|entry| entry.metadata.is_enabled())
            .map(|entry| entry.plugin.clone())
    }

    pub fn enabled_plugins(&self) -> Vec<PluginHandle> {
        self.entries
            .values()
            .filter(|entry| entry.metadata.is_enabled())
            .map(|entry| entry.plugin.clone())
            .collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state_of(name).is_some_and(|state| state.is_initialized())
    }

    pub fn initialization_order(&self) -> &[String] {
        &self.init_order
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.entries.keys().collect::<Vec<_>>())
            .field("init_order", &self.init_order)
            .finish()
    }
}
