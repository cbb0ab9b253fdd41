//! Plugin Lifecycle Module
//!
//! Generation extensions register against the engine at process start and
//! are torn down at process stop. Plugins declare dependencies by name; the
//! `PluginManager` resolves the order.
//!
//! Discovery is abstracted behind `PluginSource`. Two sources ship with the
//! engine: `StaticPluginRegistry` (every compiled-in plugin) and
//! `ManifestPluginSource` (compiled-in plugins selected by `*.plugin.toml`
//! manifests in the plugin directory).

pub mod context;
pub mod manager;
pub mod plugin;
pub mod source;

pub use context::ServiceContext;
pub use manager::{PluginManager, ShutdownReport};
pub use plugin::{Plugin, PluginHandle, PluginMetadata, PluginState};
pub use source::{
    MANIFEST_SUFFIX, ManifestPluginSource, PluginFactory, PluginManifest, PluginSource,
    StaticPluginRegistry,
};
