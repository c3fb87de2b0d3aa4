use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use contentsync_core::blocks::{RepairOptions, repair_blocks};
use contentsync_core::client::{DEFAULT_PAGE_SIZE, StrapiClient};
use contentsync_core::collection::{CollectionKind, SyncPlan};
use contentsync_core::config::SyncConfig;
use contentsync_core::export::{ExportOptions, export_collections};
use contentsync_core::reconcile::{ReconcileOptions, RecordResult, load_exports, run_sync};
use contentsync_core::record::{load_batch, load_single};
use contentsync_core::runtime::{
    PathOverrides, ResolvedPaths, ensure_exports_ready, init_layout, normalize_for_display,
    resolve_runtime,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "contentsync",
    version,
    about = "Idempotent create-or-update sync of local content exports into a Strapi-style API"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    exports_dir: Option<PathBuf>,
    #[arg(long, short, global = true, help = "Log every request at debug level")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    exports_dir: Option<PathBuf>,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            exports_dir: cli.exports_dir.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the state directory, exports directory and default config")]
    Init(InitArgs),
    #[command(about = "Show resolved paths, the collection plan and local export files")]
    Status,
    #[command(about = "Create or update remote records from the local exports")]
    Sync(SyncArgs),
    #[command(about = "Pull remote collections into the exports directory")]
    Export(ExportArgs),
    #[command(
        name = "repair-blocks",
        about = "Strip editor-only state from stored rich-text block fields"
    )]
    RepairBlocks(RepairArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite config.toml if it already exists")]
    force: bool,
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[arg(long, overrides_with = "no_dry_run", help = "Look up remote records but never write")]
    dry_run: bool,
    #[arg(long, overrides_with = "dry_run", help = "Write even if SYNC_DRY_RUN or config enables dry run")]
    no_dry_run: bool,
    #[arg(long, overrides_with = "update_existing", help = "Leave matched remote records untouched")]
    skip_existing: bool,
    #[arg(long, overrides_with = "skip_existing", help = "Update matched remote records")]
    update_existing: bool,
    #[arg(long, value_name = "NAME", num_args = 1..)]
    only: Vec<String>,
    #[arg(long, help = "Print the full report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long, value_name = "NAME", num_args = 1..)]
    only: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
    #[arg(long, help = "Strip editor-only state from block fields while exporting")]
    clean_blocks: bool,
    #[arg(long, help = "Do not export upload metadata to media.json")]
    no_media: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct RepairArgs {
    #[arg(long, overrides_with = "no_dry_run")]
    dry_run: bool,
    #[arg(long, overrides_with = "dry_run")]
    no_dry_run: bool,
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Sync(args)) => run_sync_command(&runtime, args),
        Some(Commands::Export(args)) => run_export(&runtime, args),
        Some(Commands::RepairBlocks(args)) => run_repair_blocks(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let (paths, _) = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;

    println!("Initialized contentsync layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("exports_dir: {}", normalize_for_display(&paths.exports_dir));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, config) = resolve_runtime_paths(runtime)?;
    let plan = config.sync_plan()?;

    println!("runtime status");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("config_exists: {}", format_flag(paths.config_path.exists()));
    println!("exports_dir: {}", normalize_for_display(&paths.exports_dir));
    println!("exports_exists: {}", format_flag(paths.exports_dir.is_dir()));
    println!(
        "remote_url: {}",
        config.base_url().as_deref().unwrap_or("<unset>")
    );
    println!("token_configured: {}", format_flag(config.token().is_some()));
    println!("update_existing: {}", config.update_existing());
    println!("dry_run: {}", config.dry_run());
    println!("plan: {}", plan.names().join(" -> "));

    for spec in plan.collections() {
        let path = paths.exports_dir.join(&spec.file);
        let state = if !path.exists() {
            "missing".to_string()
        } else if spec.is_singleton() {
            match load_single(&path) {
                Ok(_) => "1 record".to_string(),
                Err(error) => format!("invalid ({error:#})"),
            }
        } else {
            match load_batch(&path) {
                Ok(records) => format!("{} records", records.len()),
                Err(error) => format!("invalid ({error:#})"),
            }
        };
        let key = match &spec.kind {
            CollectionKind::Collection { key } => key.describe(),
            CollectionKind::Singleton => "<singleton>".to_string(),
        };
        println!(
            "collection.{}: {} key={} [{}]",
            spec.name, spec.file, key, state
        );
    }

    println!("\n[diagnostics]\n{}", paths.diagnostics());
    Ok(())
}

fn run_sync_command(runtime: &RuntimeOptions, args: SyncArgs) -> Result<()> {
    let (paths, config) = resolve_runtime_paths(runtime)?;
    ensure_exports_ready(&paths)?;
    let plan = select_plan(&config, &args.only)?;

    let options = ReconcileOptions {
        update_existing: flag_pair(args.update_existing, args.skip_existing)
            .unwrap_or_else(|| config.update_existing()),
        dry_run: flag_pair(args.dry_run, args.no_dry_run).unwrap_or_else(|| config.dry_run()),
    };
    let exports = load_exports(&paths.exports_dir, &plan)?;
    let mut api = StrapiClient::from_config(&config)?;
    let report = run_sync(&plan, &exports, &mut api, &options);

    if args.json {
        return print_json(&report);
    }

    println!("content sync");
    println!("remote_url: {}", api.config().base_url);
    println!("exports_dir: {}", normalize_for_display(&paths.exports_dir));
    println!("dry_run: {}", report.dry_run);
    println!("update_existing: {}", report.update_existing);
    for record in &report.records {
        println!("{}", format_record(record));
    }
    for file in &report.missing_files {
        println!("missing_file: {file}");
    }
    for collection in &report.collections {
        println!(
            "collection.{}: created={} updated={} skipped={} failed={}",
            collection.name,
            collection.stats.created,
            collection.stats.updated,
            collection.stats.skipped,
            collection.stats.failed
        );
    }
    println!("created: {}", report.stats.created);
    println!("updated: {}", report.stats.updated);
    println!("skipped: {}", report.stats.skipped);
    println!("failed: {}", report.stats.failed);
    println!("request_count: {}", report.request_count);
    println!("success: {}", report.success);
    Ok(())
}

fn run_export(runtime: &RuntimeOptions, args: ExportArgs) -> Result<()> {
    let (paths, config) = resolve_runtime_paths(runtime)?;
    let plan = select_plan(&config, &args.only)?;
    if args.page_size == 0 {
        bail!("--page-size must be at least 1");
    }

    let options = ExportOptions {
        page_size: args.page_size,
        clean_blocks: if args.clean_blocks {
            config.repair_targets()
        } else {
            Vec::new()
        },
        include_media: !args.no_media,
        ..ExportOptions::default()
    };
    let mut api = StrapiClient::from_config(&config)?;
    let report = export_collections(&mut api, &plan, &paths.exports_dir, &options)?;

    if args.json {
        return print_json(&report);
    }

    println!("content export");
    println!("remote_url: {}", api.config().base_url);
    println!("exports_dir: {}", report.exports_dir);
    for collection in &report.collections {
        println!(
            "collection.{}: {} records -> {} (cleaned {})",
            collection.name, collection.records, collection.file, collection.cleaned_records
        );
    }
    for name in &report.missing {
        println!("missing: {name}");
    }
    if let Some(count) = report.media_files {
        println!("media_files: {count}");
    }
    println!("exported_at_unix: {}", report.exported_at_unix);
    println!("request_count: {}", report.request_count);
    Ok(())
}

fn run_repair_blocks(runtime: &RuntimeOptions, args: RepairArgs) -> Result<()> {
    let (_, config) = resolve_runtime_paths(runtime)?;
    let targets = config.repair_targets();
    let options = RepairOptions {
        dry_run: flag_pair(args.dry_run, args.no_dry_run).unwrap_or_else(|| config.dry_run()),
        ..RepairOptions::default()
    };
    let mut api = StrapiClient::from_config(&config)?;
    let report = repair_blocks(&mut api, &targets, &options);

    if args.json {
        return print_json(&report);
    }

    println!("repair blocks");
    println!("remote_url: {}", api.config().base_url);
    println!("dry_run: {}", report.dry_run);
    for record in &report.records {
        let fields = if record.cleaned_fields.is_empty() {
            "<none>".to_string()
        } else {
            record.cleaned_fields.join(",")
        };
        println!(
            "[{}] {}: {} fields={}{}",
            record.outcome.as_str(),
            record.collection,
            record.label,
            fields,
            record
                .detail
                .as_deref()
                .map(|detail| format!(" ({detail})"))
                .unwrap_or_default()
        );
    }
    for name in &report.missing {
        println!("missing: {name}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    println!("updated: {}", report.stats.updated);
    println!("skipped: {}", report.stats.skipped);
    println!("failed: {}", report.stats.failed);
    println!("request_count: {}", report.request_count);
    println!("success: {}", report.success);
    Ok(())
}

/// An explicit `--x` / `--no-x` pair wins over env and config; `None` defers to them.
fn flag_pair(enable: bool, disable: bool) -> Option<bool> {
    match (enable, disable) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn select_plan(config: &SyncConfig, only: &[String]) -> Result<SyncPlan> {
    let plan = config.sync_plan()?;
    if only.is_empty() {
        Ok(plan)
    } else {
        plan.only(only)
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, SyncConfig)> {
    dotenvy::dotenv().ok();

    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
        exports_dir: runtime.exports_dir.clone(),
    };

    let (initial, _) = resolve_runtime(&overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_runtime(&overrides)
}

fn format_record(record: &RecordResult) -> String {
    let key = record
        .key
        .as_ref()
        .map(|key| format!(" ({}={})", key.field, key.value))
        .unwrap_or_default();
    let detail = record
        .detail
        .as_deref()
        .map(|detail| format!(": {detail}"))
        .unwrap_or_default();
    format!(
        "[{}] {}: {}{}{}",
        record.outcome.as_str(),
        record.collection,
        record.label,
        key,
        detail
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
