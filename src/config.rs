use crate::codegen::{TRACKING_DIR, TRACKING_FILE};
use crate::error::{EngineError, EngineResult};
use crate::logging::LogFormat;
use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

const DEFAULT_SNAPSHOT_FILE: &str = "schema.json";
const DEFAULT_PLUGIN_DIRECTORY: &str = "plugins";
const DEFAULT_ARTIFACT_TYPES: &[&str] = &["Entity", "Repository", "SQL"];
const DEFAULT_MINIMUM_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub project_root: PathBuf,
    /// Relative to `project_root`
    pub tracking_dir: PathBuf,
    pub tracking_file: String,
    pub snapshot_file: String,
    pub artifact_types: Vec<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            tracking_dir: PathBuf::from(TRACKING_DIR),
            tracking_file: TRACKING_FILE.to_string(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            artifact_types: DEFAULT_ARTIFACT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub directory: PathBuf,
    pub auto_load_on_startup: bool,
    /// Allow-list; empty admits every discovered plugin
    pub plugins_to_load: Vec<String>,
    pub plugins_to_exclude: Vec<String>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_PLUGIN_DIRECTORY),
            auto_load_on_startup: true,
            plugins_to_load: Vec::new(),
            plugins_to_exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub minimum_level: String,
    pub format: Option<LogFormat>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            minimum_level: DEFAULT_MINIMUM_LEVEL.to_string(),
            format: None,
        }
    }
}

/// Engine configuration: a fixed set of typed sections plus free-form
/// application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub generation: GenerationSettings,
    pub plugins: PluginSettings,
    pub logging: LoggingSettings,
    pub app_settings: BTreeMap<String, String>,
}

/// Every recognised `section:field` key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ConfigKey {
    #[strum(serialize = "generation:project_root")]
    ProjectRoot,
    #[strum(serialize = "generation:tracking_dir")]
    TrackingDir,
    #[strum(serialize = "generation:tracking_file")]
    TrackingFile,
    #[strum(serialize = "generation:snapshot_file")]
    SnapshotFile,
    #[strum(serialize = "generation:artifact_types")]
    ArtifactTypes,
    #[strum(serialize = "plugins:directory")]
    PluginDirectory,
    #[strum(serialize = "plugins:auto_load_on_startup")]
    AutoLoadOnStartup,
    #[strum(serialize = "plugins:plugins_to_load")]
    PluginsToLoad,
    #[strum(serialize = "plugins:plugins_to_exclude")]
    PluginsToExclude,
    #[strum(serialize = "logging:minimum_level")]
    MinimumLevel,
    #[strum(serialize = "logging:format")]
    LogFormat,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Case-insensitive; `-` and `_` are interchangeable in the field part.
    pub fn parse_key(key: &str) -> EngineResult<Self> {
        key.trim().replace('-', "_").parse().map_err(|_| {
            EngineError::invalid_argument("key", format!("unknown configuration key '{key}'"))
        })
    }
}

fn parse_bool(key: ConfigKey, value: &str) -> EngineResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(EngineError::invalid_argument(
            "value",
            format!("'{other}' is not a boolean for {key}"),
        )),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl EngineConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            project_root: cli_project_root,
            tracking_dir: cli_tracking_dir,
            artifact_types: cli_artifact_types,
            plugin_directory: cli_plugin_directory,
            no_plugins: cli_no_plugins,
            log_format: cli_log_format,
        } = args;

        let mut engine = match config.as_ref() {
            Some(path) => load_config_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(project_root) = cli_project_root {
            engine.generation.project_root = project_root;
        }
        if let Some(tracking_dir) = cli_tracking_dir {
            engine.generation.tracking_dir = tracking_dir;
        }
        if let Some(artifact_types) = cli_artifact_types {
            engine.generation.artifact_types = artifact_types;
        }
        if let Some(directory) = cli_plugin_directory {
            engine.plugins.directory = directory;
        }
        if cli_no_plugins {
            engine.plugins.auto_load_on_startup = false;
        }
        if let Some(format) = cli_log_format {
            engine.logging.format = Some(format);
        }

        engine
            .generation
            .artifact_types
            .iter_mut()
            .for_each(|t| *t = t.trim().to_string());
        engine.generation.artifact_types.retain(|t| !t.is_empty());
        engine.generation.artifact_types.dedup();

        engine.validate()?;
        Ok(engine)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.generation.artifact_types.is_empty() {
            return Err(EngineError::Config(
                "at least one artifact type must be configured".to_string(),
            ));
        }

        let tracking_dir = &self.generation.tracking_dir;
        if tracking_dir.is_absolute()
            || tracking_dir
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(EngineError::Config(format!(
                "tracking directory {tracking_dir:?} must be relative to the project root"
            )));
        }

        for file in [
            &self.generation.tracking_file,
            &self.generation.snapshot_file,
        ] {
            if file.trim().is_empty() || file.contains(['/', '\\']) {
                return Err(EngineError::Config(format!(
                    "'{file}' is not a valid file name"
                )));
            }
        }

        if let Some(conflict) = self.plugins.plugins_to_load.iter().find(|name| {
            self.plugins
                .plugins_to_exclude
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(name))
        }) {
            return Err(EngineError::Config(format!(
                "plugin '{conflict}' is both loaded and excluded"
            )));
        }

        Ok(())
    }

    /// Set a value by string key. Keys without a `section:` prefix are
    /// free-form and land in `app_settings`.
    pub fn set_value(&mut self, key: &str, value: &str) -> EngineResult<()> {
        if key.trim().is_empty() {
            return Err(EngineError::invalid_argument("key", "value must not be empty"));
        }
        if !key.contains(':') {
            self.app_settings
                .insert(key.trim().to_string(), value.to_string());
            return Ok(());
        }

        let config_key = ConfigKey::parse_key(key)?;
        match config_key {
            ConfigKey::ProjectRoot => self.generation.project_root = PathBuf::from(value.trim()),
            ConfigKey::TrackingDir => self.generation.tracking_dir = PathBuf::from(value.trim()),
            ConfigKey::TrackingFile => self.generation.tracking_file = value.trim().to_string(),
            ConfigKey::SnapshotFile => self.generation.snapshot_file = value.trim().to_string(),
            ConfigKey::ArtifactTypes => self.generation.artifact_types = parse_list(value),
            ConfigKey::PluginDirectory => self.plugins.directory = PathBuf::from(value.trim()),
            ConfigKey::AutoLoadOnStartup => {
                self.plugins.auto_load_on_startup = parse_bool(config_key, value)?
            }
            ConfigKey::PluginsToLoad => self.plugins.plugins_to_load = parse_list(value),
            ConfigKey::PluginsToExclude => self.plugins.plugins_to_exclude = parse_list(value),
            ConfigKey::MinimumLevel => {
                self.logging.minimum_level = value.trim().to_ascii_lowercase()
            }
            ConfigKey::LogFormat => {
                self.logging.format = Some(value.parse().map_err(|reason: String| {
                    EngineError::invalid_argument("value", reason)
                })?)
            }
        }
        tracing::debug!(key = %config_key, value, "configuration value set");
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        if !key.contains(':') {
            return self.app_settings.get(key.trim()).cloned();
        }

        let value = match ConfigKey::parse_key(key).ok()? {
            ConfigKey::ProjectRoot => self.generation.project_root.display().to_string(),
            ConfigKey::TrackingDir => self.generation.tracking_dir.display().to_string(),
            ConfigKey::TrackingFile => self.generation.tracking_file.clone(),
            ConfigKey::SnapshotFile => self.generation.snapshot_file.clone(),
            ConfigKey::ArtifactTypes => self.generation.artifact_types.join(","),
            ConfigKey::PluginDirectory => self.plugins.directory.display().to_string(),
            ConfigKey::AutoLoadOnStartup => self.plugins.auto_load_on_startup.to_string(),
            ConfigKey::PluginsToLoad => self.plugins.plugins_to_load.join(","),
            ConfigKey::PluginsToExclude => self.plugins.plugins_to_exclude.join(","),
            ConfigKey::MinimumLevel => self.logging.minimum_level.clone(),
            ConfigKey::LogFormat => self.logging.format?.to_string(),
        };
        Some(value)
    }

    pub fn resolve_path<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.generation.project_root.join(relative)
        }
    }

    pub fn tracking_path(&self) -> PathBuf {
        self.resolve_path(&self.generation.tracking_dir)
            .join(&self.generation.tracking_file)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolve_path(&self.generation.tracking_dir)
            .join(&self.generation.snapshot_file)
    }

    pub fn plugin_directory(&self) -> PathBuf {
        self.resolve_path(&self.plugins.directory)
    }

    pub fn ensure_project_root(&self) -> Result<()> {
        let root = &self.generation.project_root;
        anyhow::ensure!(root.exists(), "project root {:?} does not exist", root);
        anyhow::ensure!(root.is_dir(), "project root {:?} is not a directory", root);
        Ok(())
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML, JSON or TOML)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "TARGCC_PROJECT_ROOT",
        value_name = "DIR",
        help = "Project root that generated files are written under",
        global = true
    )]
    pub project_root: Option<PathBuf>,

    #[arg(
        long,
        env = "TARGCC_TRACKING_DIR",
        value_name = "DIR",
        help = "Tracking directory relative to the project root",
        global = true
    )]
    pub tracking_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "TARGCC_ARTIFACT_TYPES",
        value_name = "TYPE",
        value_delimiter = ',',
        help = "Comma-separated list of artifact types to plan",
        global = true
    )]
    pub artifact_types: Option<Vec<String>>,

    #[arg(
        long,
        env = "TARGCC_PLUGIN_DIR",
        value_name = "DIR",
        help = "Directory scanned for plugin manifests",
        global = true
    )]
    pub plugin_directory: Option<PathBuf>,

    #[arg(long, help = "Skip plugin loading at startup", global = true)]
    pub no_plugins: bool,

    #[arg(
        long,
        env = "TARGCC_LOG_FORMAT",
        value_enum,
        value_name = "FORMAT",
        help = "Log format (json or pretty)",
        global = true
    )]
    pub log_format: Option<LogFormat>,
}

pub fn load_config_file(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        "toml" => toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
