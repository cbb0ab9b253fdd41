use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use targcc_engine::codegen::GeneratedFileInfo;
use targcc_engine::schema::ExtendedProperties;
use targcc_engine::{
    CliArgs, ConventionResolver, EngineConfig, GenerationPlanner, LoggingConfig,
    SchemaChangeDetector, SchemaSnapshot, StaticPluginRegistry, init_logging, log_slow_operation,
    logging::operation_span, snapshot_store_for, start_plugins, tracker_for,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const SLOW_PLAN_THRESHOLD_MS: u64 = 2_000;

#[derive(Parser, Debug)]
#[command(
    name = "targcc-engine",
    about = "Convention resolution and incremental generation planning",
    version
)]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the semantic role of a column name
    Resolve {
        column: String,
        /// Comma-separated role override tokens, e.g. "blg,clc"
        #[arg(long = "override", value_name = "TOKENS")]
        type_override: Option<String>,
        #[arg(long)]
        do_not_audit: bool,
    },
    /// Diff a schema snapshot against the last persisted one
    Diff {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },
    /// Decide which artifacts must be regenerated for a schema snapshot
    Plan {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
        /// Persist the snapshot as the new baseline after planning
        #[arg(long)]
        save: bool,
    },
    /// Record a generated file in the tracking document
    Track {
        #[arg(long)]
        table: String,
        #[arg(long)]
        artifact_type: String,
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        hash: String,
    },
    /// List tracked files
    Files {
        #[arg(long)]
        table: Option<String>,
    },
    /// Forget tracked files for one table, or everything
    Clear {
        #[arg(long)]
        table: Option<String>,
        /// Also drop the persisted schema snapshot
        #[arg(long)]
        snapshot: bool,
    },
    /// Load plugins from the plugin directory and report their state
    Plugins,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::from_args(cli.args)?;

    let logging_config = LoggingConfig::from_env()
        .with_engine_settings(&config.logging.minimum_level, config.logging.format);
    let _guard = init_logging(logging_config)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    let span = operation_span(command_name(&cli.command), &config.generation.project_root);
    run(cli.command, &config, cancel).instrument(span).await
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Resolve { .. } => "resolve",
        Command::Diff { .. } => "diff",
        Command::Plan { .. } => "plan",
        Command::Track { .. } => "track",
        Command::Files { .. } => "files",
        Command::Clear { .. } => "clear",
        Command::Plugins => "plugins",
    }
}

async fn run(command: Command, config: &EngineConfig, cancel: CancellationToken) -> Result<()> {
    match command {
        Command::Resolve {
            column,
            type_override,
            do_not_audit,
        } => {
            let mut properties = ExtendedProperties::new();
            if let Some(tokens) = type_override {
                properties.insert(targcc_engine::conventions::TYPE_OVERRIDE_KEY, tokens);
            }
            if do_not_audit {
                properties.insert(targcc_engine::conventions::DO_NOT_AUDIT_KEY, "1");
            }
            let conventions =
                ConventionResolver::new().resolve_conventions(&column, Some(&properties));
            print_json(&conventions)
        }
        Command::Diff { snapshot } => {
            let current = read_snapshot(&snapshot).await?;
            let Some(previous) = snapshot_store_for(config, cancel).load().await else {
                println!("No previous schema snapshot; run `plan --save` first.");
                return Ok(());
            };
            let changes = SchemaChangeDetector::new().detect_changes(Some(&previous), &current);
            for description in changes.descriptions() {
                println!("{description}");
            }
            let summary = changes.summary();
            println!(
                "{} change(s): {} added, {} removed, {} modified",
                changes.total_changes(),
                summary.added,
                summary.removed,
                summary.modified
            );
            Ok(())
        }
        Command::Plan { snapshot, save } => {
            config.ensure_project_root()?;
            let started = Instant::now();
            let current = read_snapshot(&snapshot).await?;
            let store = snapshot_store_for(config, cancel.clone());
            let previous = store.load().await;
            let tracker = tracker_for(config, cancel);
            let planner = GenerationPlanner::new(&tracker, config.generation.artifact_types.clone())?;
            let plan = planner.plan(&current, previous.as_ref()).await?;
            log_slow_operation!(
                started.elapsed(),
                SLOW_PLAN_THRESHOLD_MS,
                tables = current.tables.len(),
                "planning finished"
            );
            if save {
                store.save(&current).await?;
            }
            print_json(&plan)
        }
        Command::Track {
            table,
            artifact_type,
            path,
            hash,
        } => {
            let tracker = tracker_for(config, cancel);
            let path = config.resolve_path(path);
            tracker
                .track_generated_file(GeneratedFileInfo::new(table, path, artifact_type, hash))
                .await?;
            Ok(())
        }
        Command::Files { table } => {
            let tracker = tracker_for(config, cancel);
            let files = match table {
                Some(table) => tracker.get_generated_files(&table).await?,
                None => tracker.all_generated_files().await?,
            };
            print_json(&files)
        }
        Command::Clear { table, snapshot } => {
            let tracker = tracker_for(config, cancel.clone());
            match table {
                Some(table) => tracker.clear_tracking(&table).await?,
                None => tracker.clear_all().await?,
            }
            if snapshot {
                snapshot_store_for(config, cancel).clear().await?;
            }
            Ok(())
        }
        Command::Plugins => {
            let mut manager = start_plugins(config, StaticPluginRegistry::new(), cancel).await?;
            for metadata in manager.plugins() {
                println!("{}", metadata.status());
            }
            let report = manager.shutdown_all().await;
            for (name, message) in &report.errors {
                eprintln!("{name}: {message}");
            }
            Ok(())
        }
    }
}

async fn read_snapshot(path: &Path) -> Result<SchemaSnapshot> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read schema snapshot {:?}", path))?;
    let mut snapshot: SchemaSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse schema snapshot {:?}", path))?;
    let annotated = ConventionResolver::new().annotate_snapshot(&mut snapshot);
    tracing::debug!(classified = annotated, "snapshot annotated");
    Ok(snapshot)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
