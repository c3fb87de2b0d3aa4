use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::blocks::RepairTarget;
use crate::collection::{CollectionSpec, KeyPolicy, SyncPlan};

pub const DEFAULT_USER_AGENT: &str = "contentsync/0.1";
pub const DEFAULT_EXPORTS_DIR: &str = "exports";

pub const ENV_URL: &str = "STRAPI_URL";
pub const ENV_TOKEN: &str = "STRAPI_API_TOKEN";
pub const ENV_UPDATE_EXISTING: &str = "SYNC_UPDATE_EXISTING";
pub const ENV_DRY_RUN: &str = "SYNC_DRY_RUN";

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# contentsync configuration
#
# Environment variables override these values:
#   STRAPI_URL, STRAPI_API_TOKEN, STRAPI_HTTP_TIMEOUT_MS, STRAPI_HTTP_RETRIES,
#   STRAPI_HTTP_RETRY_DELAY_MS, STRAPI_RATE_LIMIT_MS,
#   SYNC_UPDATE_EXISTING, SYNC_DRY_RUN

[remote]
# url = "https://your-instance.example.com"
timeout_ms = 30000
retries = 2
retry_delay_ms = 500
rate_limit_ms = 0

[sync]
update_existing = true
dry_run = false
exports_dir = "exports"

# Declaring any [[collections]] entry replaces the built-in website plan.
#
# [[collections]]
# name = "categories"
# key_fields = ["name"]
#
# [[collections]]
# name = "articles"
# key_fields = ["slug", "title"]
# depends_on = ["categories"]
#
# [[collections]]
# name = "home"
# singleton = true
"#;

pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub collections: Vec<CollectionEntry>,
    #[serde(default)]
    pub repair: Vec<RepairEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RemoteSection {
    pub url: Option<String>,
    pub token: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub rate_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncSection {
    pub update_existing: Option<bool>,
    pub dry_run: Option<bool>,
    pub exports_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CollectionEntry {
    pub name: String,
    pub file: Option<String>,
    #[serde(default)]
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepairEntry {
    pub collection: String,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_prefixes: Vec<String>,
}

impl SyncConfig {
    /// Resolve the remote base URL: env STRAPI_URL > config > None.
    pub fn base_url(&self) -> Option<String> {
        self.base_url_with(&process_env)
    }

    pub(crate) fn base_url_with(&self, lookup: EnvLookup<'_>) -> Option<String> {
        lookup(ENV_URL)
            .or_else(|| self.remote.url.clone())
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
    }

    /// Resolve the bearer token: env STRAPI_API_TOKEN > config > None.
    pub fn token(&self) -> Option<String> {
        self.token_with(&process_env)
    }

    pub(crate) fn token_with(&self, lookup: EnvLookup<'_>) -> Option<String> {
        lookup(ENV_TOKEN).or_else(|| {
            self.remote
                .token
                .clone()
                .filter(|token| !token.trim().is_empty())
        })
    }

    pub fn user_agent(&self) -> String {
        self.remote
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve update-existing: env SYNC_UPDATE_EXISTING > config > true.
    pub fn update_existing(&self) -> bool {
        self.update_existing_with(&process_env)
    }

    pub(crate) fn update_existing_with(&self, lookup: EnvLookup<'_>) -> bool {
        lookup(ENV_UPDATE_EXISTING)
            .and_then(|value| parse_flag(&value))
            .or(self.sync.update_existing)
            .unwrap_or(true)
    }

    /// Resolve dry-run: env SYNC_DRY_RUN > config > false.
    pub fn dry_run(&self) -> bool {
        self.dry_run_with(&process_env)
    }

    pub(crate) fn dry_run_with(&self, lookup: EnvLookup<'_>) -> bool {
        lookup(ENV_DRY_RUN)
            .and_then(|value| parse_flag(&value))
            .or(self.sync.dry_run)
            .unwrap_or(false)
    }

    pub fn exports_dir(&self) -> &str {
        self.sync
            .exports_dir
            .as_deref()
            .unwrap_or(DEFAULT_EXPORTS_DIR)
    }

    /// Build the collection plan; an empty `[[collections]]` list means the website default.
    pub fn sync_plan(&self) -> Result<SyncPlan> {
        if self.collections.is_empty() {
            return Ok(SyncPlan::website_default());
        }

        let mut specs = Vec::with_capacity(self.collections.len());
        for entry in &self.collections {
            let spec = if entry.singleton {
                CollectionSpec::singleton(&entry.name)
            } else {
                let key_fields = entry
                    .key_fields
                    .iter()
                    .map(|field| field.trim().to_string())
                    .filter(|field| !field.is_empty())
                    .collect::<Vec<_>>();
                if key_fields.is_empty() {
                    bail!(
                        "collection `{}` needs at least one key_fields entry (or singleton = true)",
                        entry.name
                    );
                }
                CollectionSpec::collection(&entry.name, KeyPolicy::Fields(key_fields))
            };
            let spec = match &entry.file {
                Some(file) if !file.trim().is_empty() => spec.with_file(file.trim()),
                _ => spec,
            };
            specs.push(spec.depends_on(entry.depends_on.iter().cloned()));
        }
        SyncPlan::new(specs)
    }

    /// Blocks-repair targets; an empty `[[repair]]` list means the website default.
    pub fn repair_targets(&self) -> Vec<RepairTarget> {
        if self.repair.is_empty() {
            return RepairTarget::website_default();
        }
        self.repair
            .iter()
            .map(|entry| RepairTarget {
                collection: entry.collection.clone(),
                singleton: entry.singleton,
                fields: entry.fields.clone(),
                field_prefixes: entry.field_prefixes.clone(),
            })
            .collect()
    }
}

/// Load and parse a SyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Write the commented default config. Returns `true` when a write occurred.
pub fn write_default_config(config_path: &Path, force: bool) -> Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }
    let parent = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", config_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    fs::write(config_path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn process_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn env_u64(lookup: EnvLookup<'_>, key: &str) -> Option<u64> {
    lookup(key).and_then(|value| value.trim().parse::<u64>().ok())
}

pub(crate) fn env_usize(lookup: EnvLookup<'_>, key: &str) -> Option<usize> {
    lookup(key).and_then(|value| value.trim().parse::<usize>().ok())
}
