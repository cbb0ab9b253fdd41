//! Plugin Lifecycle Integration Tests
//!
//! Test plugins append to a shared event log so initialization and shutdown
//! order can be asserted directly.

use assert_matches::assert_matches;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use targcc_engine::error::EngineError;
use targcc_engine::plugins::{
    ManifestPluginSource, Plugin, PluginHandle, PluginManager, PluginState, ServiceContext,
    StaticPluginRegistry,
};
use tokio_util::sync::CancellationToken;

type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Default)]
struct TestPlugin {
    name: &'static str,
    dependencies: Vec<String>,
    log: EventLog,
    invalid: Option<&'static str>,
    fail_init: bool,
    fail_shutdown: bool,
    hang_shutdown: bool,
}

impl TestPlugin {
    fn new(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: log.clone(),
            ..Self::default()
        }
    }

    fn depends_on(mut self, dependency: &str) -> Self {
        self.dependencies.push(dependency.to_string());
        self
    }
}

#[async_trait::async_trait]
impl Plugin for TestPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn validate(&self) -> Option<String> {
        self.invalid.map(str::to_string)
    }

    async fn initialize(
        &self,
        services: &ServiceContext,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        if self.fail_init {
            anyhow::bail!("connection refused");
        }
        if let Some(prefix) = services.get::<String>() {
            self.log.lock().push(format!("{prefix}:{}", self.name));
        }
        self.log.lock().push(format!("init:{}", self.name));
        Ok(())
    }

    async fn shutdown(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if self.hang_shutdown {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.log.lock().push(format!("shutdown:{}", self.name));
        if self.fail_shutdown {
            anyhow::bail!("flush failed");
        }
        Ok(())
    }
}

fn registry(plugins: Vec<TestPlugin>) -> StaticPluginRegistry {
    plugins.into_iter().fold(StaticPluginRegistry::new(), |registry, plugin| {
        let name = plugin.name;
        registry.register(name, move || -> PluginHandle { Arc::new(plugin.clone()) })
    })
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().clone()
}

fn state(manager: &PluginManager, name: &str) -> PluginState {
    manager.plugin(name).map(|m| m.state).unwrap()
}

fn last_error(manager: &PluginManager, name: &str) -> String {
    manager
        .plugin(name)
        .and_then(|m| m.last_error.clone())
        .unwrap_or_default()
}

const NOWHERE: &str = "/nonexistent/plugins";

// =============================================================================
// Loading
// =============================================================================

#[tokio::test]
async fn test_dependencies_initialize_first_and_shut_down_last() {
    let log = EventLog::default();
    let mut manager = PluginManager::new(registry(vec![
        TestPlugin::new("Reporting", &log).depends_on("Audit"),
        TestPlugin::new("Audit", &log),
        TestPlugin::new("Export", &log).depends_on("Reporting"),
    ]));

    let enabled = manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap();

    assert_eq!(enabled, 3);
    assert_eq!(manager.initialization_order(), ["Audit", "Reporting", "Export"]);
    assert_eq!(manager.enabled_plugins().len(), 3);

    let report = manager.shutdown_all().await;
    assert!(report.is_clean());
    assert_eq!(report.shut_down, vec!["Export", "Reporting", "Audit"]);
    assert_eq!(
        events(&log),
        vec![
            "init:Audit",
            "init:Reporting",
            "init:Export",
            "shutdown:Export",
            "shutdown:Reporting",
            "shutdown:Audit",
        ]
    );
    assert!(manager.plugins().all(|m| m.state == PluginState::ShutDown));
}

#[tokio::test]
async fn test_validation_rejection_fails_plugin() {
    let log = EventLog::default();
    let mut broken = TestPlugin::new("Broken", &log);
    broken.invalid = Some("template directory missing");
    let mut manager = PluginManager::new(registry(vec![broken, TestPlugin::new("Audit", &log)]));

    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 1);

    assert_eq!(state(&manager, "Broken"), PluginState::Failed);
    assert_eq!(
        last_error(&manager, "Broken"),
        "validation failed: template directory missing"
    );
    assert!(manager.get_plugin("Broken").is_none());
    assert!(manager.get_plugin("Audit").is_some());
}

#[tokio::test]
async fn test_missing_and_failed_dependencies_propagate() {
    let log = EventLog::default();
    let mut audit = TestPlugin::new("Audit", &log);
    audit.invalid = Some("bad config");
    let mut manager = PluginManager::new(registry(vec![
        TestPlugin::new("Orphan", &log).depends_on("Ghost"),
        audit,
        TestPlugin::new("Reporting", &log).depends_on("Audit"),
        TestPlugin::new("Export", &log).depends_on("Reporting"),
    ]));

    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 0);

    assert_eq!(last_error(&manager, "Orphan"), "missing dependency 'Ghost'");
    assert_eq!(last_error(&manager, "Reporting"), "dependency 'Audit' failed");
    assert_eq!(last_error(&manager, "Export"), "dependency 'Reporting' failed");
    assert!(events(&log).is_empty());
}

#[tokio::test]
async fn test_dependency_cycle_fails_members() {
    let log = EventLog::default();
    let mut manager = PluginManager::new(registry(vec![
        TestPlugin::new("A", &log).depends_on("B"),
        TestPlugin::new("B", &log).depends_on("A"),
        TestPlugin::new("C", &log),
    ]));

    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 1);

    assert_eq!(last_error(&manager, "A"), "dependency cycle");
    assert_eq!(last_error(&manager, "B"), "dependency cycle");
    assert_eq!(manager.initialization_order(), ["C"]);
}

#[tokio::test]
async fn test_initialization_error_is_isolated() {
    let log = EventLog::default();
    let mut flaky = TestPlugin::new("Flaky", &log);
    flaky.fail_init = true;
    let mut manager = PluginManager::new(registry(vec![
        flaky,
        TestPlugin::new("Dependent", &log).depends_on("Flaky"),
        TestPlugin::new("Audit", &log),
    ]));

    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 1);

    assert_eq!(state(&manager, "Flaky"), PluginState::Failed);
    assert!(last_error(&manager, "Flaky").contains("initialization failed: connection refused"));
    assert_eq!(last_error(&manager, "Dependent"), "dependency 'Flaky' failed");
    assert_eq!(events(&log), vec!["init:Audit"]);
}

#[tokio::test]
async fn test_filter_and_duplicates() {
    let log = EventLog::default();
    let source = registry(vec![
        TestPlugin::new("Audit", &log),
        TestPlugin::new("Reporting", &log),
        TestPlugin::new("Export", &log),
    ]);
    let mut manager = PluginManager::new(source).with_filter(
        vec!["audit".to_string(), "export".to_string()],
        vec!["EXPORT".to_string()],
    );

    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 1);
    assert!(manager.is_loaded("Audit"));
    assert!(manager.plugin("Reporting").is_none());
    assert!(manager.plugin("Export").is_none());

    // A second load sees the same plugins again and skips them.
    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 0);
    assert_eq!(events(&log), vec!["init:Audit"]);
}

#[tokio::test]
async fn test_services_are_visible_to_plugins() {
    let log = EventLog::default();
    let services = ServiceContext::new();
    services.insert("ctx".to_string());
    let mut manager =
        PluginManager::new(registry(vec![TestPlugin::new("Audit", &log)])).with_services(services);

    manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap();

    assert_eq!(events(&log), vec!["ctx:Audit", "init:Audit"]);
    assert!(manager.services().contains::<String>());
}

#[tokio::test]
async fn test_cancelled_load_stops_initialization() {
    let log = EventLog::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut manager = PluginManager::new(registry(vec![TestPlugin::new("Audit", &log)]))
        .with_cancellation(cancel);

    let result = manager.load_and_initialize(Path::new(NOWHERE)).await;

    assert_matches!(result, Err(EngineError::Cancelled { .. }));
    assert!(events(&log).is_empty());
    assert!(!manager.is_loaded("Audit"));
}

// =============================================================================
// Explicit transitions
// =============================================================================

#[tokio::test]
async fn test_initialize_twice_is_rejected() {
    let log = EventLog::default();
    let mut manager = PluginManager::new(registry(vec![TestPlugin::new("Audit", &log)]));
    manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap();

    assert_matches!(
        manager.initialize("Audit").await,
        Err(EngineError::PluginAlreadyInitialized { ref name }) if name == "Audit"
    );
    assert_matches!(
        manager.initialize("Ghost").await,
        Err(EngineError::PluginNotFound { .. })
    );
    assert_matches!(
        manager.initialize("").await,
        Err(EngineError::InvalidArgument { .. })
    );
}

#[tokio::test]
async fn test_retry_after_failed_initialization() {
    let log = EventLog::default();
    let mut flaky = TestPlugin::new("Flaky", &log);
    flaky.fail_init = true;
    let mut manager = PluginManager::new(registry(vec![flaky]));
    manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap();

    assert_matches!(
        manager.initialize("Flaky").await,
        Err(EngineError::PluginFailed { ref message, .. }) if message.contains("connection refused")
    );
    assert_eq!(state(&manager, "Flaky"), PluginState::Failed);
}

#[tokio::test]
async fn test_initialize_rejected_plugin_runs_self_check_again() {
    let log = EventLog::default();
    let mut bad = TestPlugin::new("Bad", &log);
    bad.invalid = Some("unsupported host");
    let mut manager = PluginManager::new(registry(vec![bad]));
    assert_eq!(manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap(), 0);

    assert_matches!(
        manager.initialize("Bad").await,
        Err(EngineError::PluginFailed { ref message, .. }) if message.contains("unsupported host")
    );
    assert_eq!(state(&manager, "Bad"), PluginState::Failed);
    assert!(manager.get_plugin("Bad").is_none());
    assert!(events(&log).is_empty());
}

#[tokio::test]
async fn test_enable_disable_transitions() {
    let log = EventLog::default();
    let mut broken = TestPlugin::new("Broken", &log);
    broken.invalid = Some("nope");
    let mut manager = PluginManager::new(registry(vec![TestPlugin::new("Audit", &log), broken]));
    manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap();

    manager.enable("Audit").await.unwrap();
    assert_eq!(state(&manager, "Audit"), PluginState::Enabled);

    manager.disable("Audit").await.unwrap();
    manager.disable("Audit").await.unwrap();
    assert_eq!(state(&manager, "Audit"), PluginState::Disabled);
    assert!(manager.get_plugin("Audit").is_none());
    assert!(manager.is_loaded("Audit"));

    manager.enable("Audit").await.unwrap();
    assert!(manager.get_plugin("Audit").is_some());

    assert_matches!(
        manager.enable("Broken").await,
        Err(EngineError::PluginFailed { ref message, .. }) if message.contains("not initialized")
    );
    assert_matches!(
        manager.disable("Ghost").await,
        Err(EngineError::PluginNotFound { .. })
    );
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_collects_errors_and_continues() {
    let log = EventLog::default();
    let mut audit = TestPlugin::new("Audit", &log);
    audit.fail_shutdown = true;
    let mut hung = TestPlugin::new("Hung", &log);
    hung.hang_shutdown = true;
    let mut manager = PluginManager::new(registry(vec![audit, hung, TestPlugin::new("Export", &log)]))
        .with_shutdown_timeout(Duration::from_millis(50));
    manager.load_and_initialize(Path::new(NOWHERE)).await.unwrap();
    manager.disable("Export").await.unwrap();

    let report = manager.shutdown_all().await;

    assert!(!report.is_clean());
    assert_eq!(report.shut_down, vec!["Export", "Hung", "Audit"]);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].0, "Hung");
    assert!(report.errors[0].1.starts_with("shutdown timed out"));
    assert_eq!(report.errors[1], ("Audit".to_string(), "shutdown failed: flush failed".to_string()));
    assert!(manager.initialization_order().is_empty());

    assert_matches!(
        manager.initialize("Audit").await,
        Err(EngineError::PluginFailed { ref message, .. }) if message == "plugin has been shut down"
    );

    // Nothing left to shut down.
    assert!(manager.shutdown_all().await.shut_down.is_empty());
}

// =============================================================================
// Manifest discovery
// =============================================================================

#[tokio::test]
async fn test_manifest_source_discovers_registered_factories() {
    let log = EventLog::default();
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();
    write("audit.plugin.toml", "name = \"Audit\"\n");
    write("b-reporting.PLUGIN.toml", "name = \"Reports\"\nfactory = \"Reporting\"\n");
    write("c-export.plugin.toml", "name = \"Export\"\nenabled = false\n");
    write("d-ghost.plugin.toml", "name = \"Ghost\"\n");
    write("e-broken.plugin.toml", "name = [\n");
    write("readme.toml", "name = \"Audit\"\n");

    let source = ManifestPluginSource::new(registry(vec![
        TestPlugin::new("Audit", &log),
        TestPlugin::new("Reporting", &log).depends_on("Audit"),
        TestPlugin::new("Export", &log),
    ]));
    let mut manager = PluginManager::new(source);

    let enabled = manager.load_and_initialize(dir.path()).await.unwrap();

    assert_eq!(enabled, 2);
    assert_eq!(manager.initialization_order(), ["Audit", "Reporting"]);
    assert!(manager.plugin("Export").is_none());
    assert!(manager.plugin("Ghost").is_none());
}

#[tokio::test]
async fn test_manifest_source_missing_directory_is_empty() {
    let log = EventLog::default();
    let dir = tempfile::tempdir().unwrap();
    let source = ManifestPluginSource::new(registry(vec![TestPlugin::new("Audit", &log)]));
    let mut manager = PluginManager::new(source);

    let enabled = manager
        .load_and_initialize(&dir.path().join("plugins"))
        .await
        .unwrap();

    assert_eq!(enabled, 0);
    assert_eq!(manager.plugins().count(), 0);
}
