use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::{SyncConfig, load_config};

pub const STATE_DIR_NAME: &str = ".contentsync";
pub const CONFIG_FILENAME: &str = "config.toml";

pub const ENV_PROJECT_ROOT: &str = "CONTENTSYNC_PROJECT_ROOT";
pub const ENV_CONFIG: &str = "CONTENTSYNC_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub exports_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub exports_dir: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
    pub exports_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({})\nexports_dir={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.exports_dir),
            self.exports_source.as_str(),
        )
    }
}

/// Resolve project paths and load the config they point at.
pub fn resolve_runtime(overrides: &PathOverrides) -> Result<(ResolvedPaths, SyncConfig)> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    let env_root = env::var_os(ENV_PROJECT_ROOT).map(PathBuf::from);
    let env_config = env::var_os(ENV_CONFIG).map(PathBuf::from);
    resolve_runtime_from(&cwd, overrides, env_root, env_config)
}

pub(crate) fn resolve_runtime_from(
    cwd: &Path,
    overrides: &PathOverrides,
    env_root: Option<PathBuf>,
    env_config: Option<PathBuf>,
) -> Result<(ResolvedPaths, SyncConfig)> {
    let (project_root, root_source) = match (&overrides.project_root, env_root) {
        (Some(path), _) => (absolutize(cwd, path), ValueSource::Flag),
        (None, Some(path)) if !path.as_os_str().is_empty() => {
            (absolutize(cwd, &path), ValueSource::Env)
        }
        _ => (cwd.to_path_buf(), ValueSource::Default),
    };
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = match (&overrides.config, env_config) {
        (Some(path), _) => (absolutize(&project_root, path), ValueSource::Flag),
        (None, Some(path)) if !path.as_os_str().is_empty() => {
            (absolutize(&project_root, &path), ValueSource::Env)
        }
        _ => (state_dir.join(CONFIG_FILENAME), ValueSource::Default),
    };
    let config = load_config(&config_path)?;

    let (exports_dir, exports_source) = match &overrides.exports_dir {
        Some(path) => (absolutize(&project_root, path), ValueSource::Flag),
        None if config.sync.exports_dir.is_some() => (
            absolutize(&project_root, Path::new(config.exports_dir())),
            ValueSource::Config,
        ),
        None => (
            project_root.join(config.exports_dir()),
            ValueSource::Default,
        ),
    };

    Ok((
        ResolvedPaths {
            project_root,
            state_dir,
            config_path,
            exports_dir,
            root_source,
            config_source,
            exports_source,
        },
        config,
    ))
}

/// The local export is the source of truth; without it there is nothing to reconcile.
pub fn ensure_exports_ready(paths: &ResolvedPaths) -> Result<()> {
    if !paths.exports_dir.exists() {
        bail!(
            "Exports directory not found: {}\nRun `contentsync export` (or copy an export) first.",
            normalize_for_display(&paths.exports_dir)
        );
    }
    if !paths.exports_dir.is_dir() {
        bail!(
            "Exports path is not a directory: {}",
            normalize_for_display(&paths.exports_dir)
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn init_layout(paths: &ResolvedPaths, force: bool) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.exports_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }
    let wrote_config = crate::config::write_default_config(&paths.config_path, force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
