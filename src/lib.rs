pub mod changes;
pub mod codegen;
pub mod config;
pub mod conventions;
pub mod error;
pub mod guards;
pub mod logging;
pub mod plugins;
pub mod schema;
pub mod utils;

pub use changes::{SchemaChangeDetector, SchemaChanges};
pub use codegen::{GenerationPlan, GenerationPlanner, GenerationTracker, SafeArtifactWriter};
pub use config::{CliArgs, ConfigKey, EngineConfig};
pub use conventions::{ColumnConventions, ColumnRole, ConventionResolver};
pub use error::{EngineError, EngineResult, ErrorCode, ProtectedFileWriteError};
pub use logging::{LoggingConfig, init_logging};
pub use plugins::{ManifestPluginSource, PluginManager, StaticPluginRegistry};
pub use schema::{SchemaSnapshot, SnapshotStore};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Tracker for the configured project and tracking document.
pub fn tracker_for(config: &EngineConfig, cancel: CancellationToken) -> GenerationTracker {
    GenerationTracker::new(config.tracking_path()).with_cancellation(cancel)
}

pub fn snapshot_store_for(config: &EngineConfig, cancel: CancellationToken) -> SnapshotStore {
    SnapshotStore::new(config.snapshot_path()).with_cancellation(cancel)
}

/// Build a plugin manager over the configured plugin directory and, when
/// auto-loading is enabled, load and initialize it.
pub async fn start_plugins(
    config: &EngineConfig,
    registry: StaticPluginRegistry,
    cancel: CancellationToken,
) -> Result<PluginManager> {
    let mut manager = PluginManager::new(ManifestPluginSource::new(registry))
        .with_filter(
            config.plugins.plugins_to_load.clone(),
            config.plugins.plugins_to_exclude.clone(),
        )
        .with_cancellation(cancel);

    if !config.plugins.auto_load_on_startup {
        tracing::info!("plugin auto-load disabled");
        return Ok(manager);
    }

    let directory = config.plugin_directory();
    let enabled = manager.load_and_initialize(&directory).await?;
    for metadata in manager.plugins() {
        if metadata.last_error.is_some() {
            tracing::warn!(status = %metadata.status(), "plugin not available");
        }
    }
    tracing::info!(
        enabled,
        directory = %directory.display(),
        "plugin startup complete"
    );
    Ok(manager)
}
