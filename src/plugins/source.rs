//! Plugin discovery
//!
//! Loading arbitrary shared libraries is not supported. Plugins are compiled
//! in and registered by name in a `StaticPluginRegistry`; a plugin directory
//! then selects which of them a project uses through `*.plugin.toml`
//! manifests:
//!
//! ```toml
//! name = "Audit Columns"
//! factory = "audit-columns"
//! enabled = true
//! ```

use crate::error::EngineResult;
use crate::plugins::PluginHandle;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub const MANIFEST_SUFFIX: &str = ".plugin.toml";

/// Capability that produces candidate plugins for a directory.
pub trait PluginSource: Send + Sync {
    fn discover(&self, directory: &Path) -> EngineResult<Vec<PluginHandle>>;
}

pub type PluginFactory = Arc<dyn Fn() -> PluginHandle + Send + Sync>;

/// Compiled-in plugin factories keyed by name.
#[derive(Clone, Default)]
pub struct StaticPluginRegistry {
    factories: IndexMap<String, PluginFactory>,
}

impl StaticPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> PluginHandle + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn create(&self, name: &str) -> Option<PluginHandle> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for StaticPluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticPluginRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Every registered plugin, regardless of directory.
impl PluginSource for StaticPluginRegistry {
    fn discover(&self, _directory: &Path) -> EngineResult<Vec<PluginHandle>> {
        Ok(self.factories.values().map(|factory| factory()).collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    /// Registry key; defaults to `name`
    #[serde(default)]
    pub factory: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    pub fn factory_name(&self) -> &str {
        self.factory.as_deref().unwrap_or(&self.name)
    }
}

/// Discovers plugins from `*.plugin.toml` manifests under a directory.
#[derive(Debug, Clone)]
pub struct ManifestPluginSource {
    registry: StaticPluginRegistry,
}

impl ManifestPluginSource {
    pub fn new(registry: StaticPluginRegistry) -> Self {
        Self { registry }
    }

    fn manifest_paths(directory: &Path) -> Vec<PathBuf> {
        WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable plugin directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name.to_ascii_lowercase().ends_with(MANIFEST_SUFFIX))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect()
    }

    fn read_manifest(path: &Path) -> Option<PluginManifest> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read plugin manifest");
                return None;
            }
        };
        match toml::from_str::<PluginManifest>(&contents) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid plugin manifest");
                None
            }
        }
    }
}

impl PluginSource for ManifestPluginSource {
    fn discover(&self, directory: &Path) -> EngineResult<Vec<PluginHandle>> {
        if !directory.is_dir() {
            tracing::debug!(directory = %directory.display(), "plugin directory not found");
            return Ok(Vec::new());
        }

        let mut plugins = Vec::new();
        for path in Self::manifest_paths(directory) {
            let Some(manifest) = Self::read_manifest(&path) else {
                continue;
            };
            if !manifest.enabled {
                tracing::debug!(plugin = %manifest.name, "plugin disabled by manifest");
                continue;
            }
            match self.registry.create(manifest.factory_name()) {
                Some(plugin) => {
                    tracing::debug!(
                        plugin = %plugin.name(),
                        manifest = %path.display(),
                        "discovered plugin"
                    );
                    plugins.push(plugin);
                }
                None => tracing::warn!(
                    factory = %manifest.factory_name(),
                    manifest = %path.display(),
                    "plugin manifest names an unknown factory"
                ),
            }
        }
        Ok(plugins)
    }
}
