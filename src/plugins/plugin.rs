use crate::plugins::ServiceContext;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use strum::Display;
use tokio_util::sync::CancellationToken;

/// A generation-extension unit managed by the `PluginManager`.
///
/// Dependencies are declared by name; the manager orders initialization so
/// every dependency is initialized first and shut down last.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Semantic version string
    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn author(&self) -> &str {
        ""
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Self-check run before initialization. A non-empty reason rejects the
    /// plugin.
    fn validate(&self) -> Option<String> {
        None
    }

    async fn initialize(
        &self,
        services: &ServiceContext,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;

    async fn shutdown(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

pub type PluginHandle = Arc<dyn Plugin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum PluginState {
    Discovered,
    Validated,
    Initialized,
    Enabled,
    Disabled,
    ShutDown,
    Failed,
}

impl PluginState {
    /// States in which `initialize` has run successfully and `shutdown` has not.
    pub fn is_initialized(&self) -> bool {
        matches!(
            self,
            PluginState::Initialized | PluginState::Enabled | PluginState::Disabled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub dependencies: Vec<String>,
    pub state: PluginState,
    pub loaded_at: DateTime<Utc>,
    pub initialized_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PluginMetadata {
    pub(crate) fn from_plugin(plugin: &dyn Plugin) -> Self {
        Self {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
            author: plugin.author().to_string(),
            dependencies: plugin.dependencies(),
            state: PluginState::Discovered,
            loaded_at: Utc::now(),
            initialized_at: None,
            last_error: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == PluginState::Enabled
    }

    /// One-line status, e.g. `Reporting v1.2.0 [Failed: missing dependency 'Audit']`.
    pub fn status(&self) -> String {
        match &self.last_error {
            Some(error) => format!("{} v{} [{}: {}]", self.name, self.version, self.state, error),
            None => format!("{} v{} [{}]", self.name, self.version, self.state),
        }
    }
}
