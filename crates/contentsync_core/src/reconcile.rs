//! Create-or-update reconciliation of local export batches against the content API.
//!
//! Records are processed strictly in order, one call in flight at a time. A write
//! failure is recorded against its record and never aborts the batch; a failed
//! lookup is treated as "no match" so the record falls through to create.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::{ContentReadApi, ContentWriteApi};
use crate::collection::{CollectionKind, KeyPolicy, MatchingKey, SyncPlan};
use crate::record::{Record, RemoteRecord, load_batch, load_single};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl RecordOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResult {
    pub collection: String,
    pub label: String,
    pub key: Option<MatchingKey>,
    pub outcome: RecordOutcome,
    pub remote_id: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncStats {
    pub fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    pub fn from_outcomes(outcomes: impl IntoIterator<Item = RecordOutcome>) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.record(outcome);
        }
        stats
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a RecordResult>) -> Self {
        Self::from_outcomes(results.into_iter().map(|result| result.outcome))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub update_existing: bool,
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            update_existing: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub name: String,
    pub singleton: bool,
    pub stats: SyncStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub dry_run: bool,
    pub update_existing: bool,
    pub stats: SyncStats,
    pub collections: Vec<CollectionReport>,
    pub records: Vec<RecordResult>,
    pub missing_files: Vec<String>,
    pub request_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Many(Vec<Record>),
    Single(Record),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Self::Many(records) => records.len(),
            Self::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every local batch the plan names, loaded before any network call.
#[derive(Debug, Clone, Default)]
pub struct LoadedExports {
    pub batches: Vec<(String, Batch)>,
    pub missing_files: Vec<String>,
}

impl LoadedExports {
    pub fn get(&self, collection: &str) -> Option<&Batch> {
        self.batches
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, batch)| batch)
    }
}

pub fn load_exports(exports_dir: &Path, plan: &SyncPlan) -> Result<LoadedExports> {
    if !exports_dir.is_dir() {
        bail!("exports directory not found: {}", exports_dir.display());
    }

    let mut loaded = LoadedExports::default();
    for spec in plan.collections() {
        let path = exports_dir.join(&spec.file);
        if !path.exists() {
            info!(collection = %spec.name, file = %spec.file, "no export file; collection skipped");
            loaded.missing_files.push(spec.file.clone());
            continue;
        }
        let batch = match spec.kind {
            CollectionKind::Singleton => Batch::Single(load_single(&path)?),
            CollectionKind::Collection { .. } => Batch::Many(load_batch(&path)?),
        };
        loaded.batches.push((spec.name.clone(), batch));
    }
    if loaded.batches.is_empty() {
        bail!(
            "no export files found in {} (expected one of: {})",
            exports_dir.display(),
            loaded.missing_files.join(", ")
        );
    }
    Ok(loaded)
}

/// Reconcile every loaded batch in plan order.
pub fn run_sync<A: ContentWriteApi>(
    plan: &SyncPlan,
    exports: &LoadedExports,
    api: &mut A,
    options: &ReconcileOptions,
) -> SyncReport {
    let mut collections = Vec::new();
    let mut records = Vec::new();

    for spec in plan.collections() {
        let Some(batch) = exports.get(&spec.name) else {
            continue;
        };
        info!(collection = %spec.name, records = batch.len(), "syncing collection");

        let results = match (&spec.kind, batch) {
            (CollectionKind::Collection { key }, Batch::Many(batch)) => {
                reconcile_collection(&spec.name, key, batch, api, options)
            }
            (CollectionKind::Singleton, Batch::Single(record)) => {
                vec![reconcile_singleton(&spec.name, record, api, options)]
            }
            (CollectionKind::Collection { key }, Batch::Single(record)) => {
                reconcile_collection(&spec.name, key, std::slice::from_ref(record), api, options)
            }
            (CollectionKind::Singleton, Batch::Many(batch)) => batch
                .iter()
                .map(|record| reconcile_singleton(&spec.name, record, api, options))
                .collect(),
        };

        collections.push(CollectionReport {
            name: spec.name.clone(),
            singleton: spec.is_singleton(),
            stats: SyncStats::from_results(&results),
        });
        records.extend(results);
    }

    let stats = SyncStats::from_results(&records);
    SyncReport {
        success: stats.failed == 0,
        dry_run: options.dry_run,
        update_existing: options.update_existing,
        stats,
        collections,
        records,
        missing_files: exports.missing_files.clone(),
        request_count: api.request_count(),
    }
}

pub fn reconcile_collection<A: ContentWriteApi>(
    collection: &str,
    key_policy: &KeyPolicy,
    records: &[Record],
    api: &mut A,
    options: &ReconcileOptions,
) -> Vec<RecordResult> {
    // Keys a dry run would have created; a real run would find them on the next lookup.
    let mut predicted = BTreeSet::new();
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let result = reconcile_record(
                collection,
                key_policy,
                index,
                record,
                api,
                options,
                &mut predicted,
            );
            log_result(&result, options.dry_run);
            result
        })
        .collect()
}

fn reconcile_record<A: ContentWriteApi>(
    collection: &str,
    key_policy: &KeyPolicy,
    index: usize,
    record: &Record,
    api: &mut A,
    options: &ReconcileOptions,
    predicted: &mut BTreeSet<(String, String)>,
) -> RecordResult {
    let key = key_policy.resolve(&record.data);
    let label = key
        .as_ref()
        .map(|key| key.value.clone())
        .unwrap_or_else(|| format!("#{index}"));
    let existing = key
        .as_ref()
        .and_then(|key| remote_lookup(api, collection, key));
    let predicted_key = key
        .as_ref()
        .map(|key| (key.field.clone(), key.value.clone()));
    let pending_create = options.dry_run
        && existing.is_none()
        && predicted_key
            .as_ref()
            .is_some_and(|key| predicted.contains(key));

    let mut result = RecordResult {
        collection: collection.to_string(),
        label,
        key,
        outcome: RecordOutcome::Skipped,
        remote_id: None,
        detail: None,
    };

    if pending_create {
        if options.update_existing {
            result.outcome = RecordOutcome::Updated;
        } else {
            result.detail = Some("already exists".to_string());
        }
        return result;
    }

    match existing {
        Some(existing) if !options.update_existing => {
            result.remote_id = Some(existing.id);
            result.detail = Some("already exists".to_string());
        }
        Some(existing) if options.dry_run => {
            result.outcome = RecordOutcome::Updated;
            result.remote_id = Some(existing.id);
        }
        Some(existing) => match api.update(collection, &existing.id, &record.data) {
            Ok(remote_id) => {
                result.outcome = RecordOutcome::Updated;
                result.remote_id = remote_id.or(Some(existing.id));
            }
            Err(error) => {
                result.outcome = RecordOutcome::Failed;
                result.remote_id = Some(existing.id);
                result.detail = Some(format!("update failed: {error:#}"));
            }
        },
        None if options.dry_run => {
            result.outcome = RecordOutcome::Created;
            if let Some(key) = predicted_key {
                predicted.insert(key);
            }
        }
        None => match api.create(collection, &record.data) {
            Ok(remote_id) => {
                result.outcome = RecordOutcome::Created;
                result.remote_id = remote_id;
            }
            Err(error) => {
                result.outcome = RecordOutcome::Failed;
                result.detail = Some(format!("create failed: {error:#}"));
            }
        },
    }

    result
}

/// Singletons have no key and are never created: always update in place.
pub fn reconcile_singleton<A: ContentWriteApi>(
    singleton: &str,
    record: &Record,
    api: &mut A,
    options: &ReconcileOptions,
) -> RecordResult {
    let mut result = RecordResult {
        collection: singleton.to_string(),
        label: singleton.to_string(),
        key: None,
        outcome: RecordOutcome::Updated,
        remote_id: None,
        detail: None,
    };
    if !options.dry_run
        && let Err(error) = api.update_single(singleton, &record.data)
    {
        result.outcome = RecordOutcome::Failed;
        result.detail = Some(format!("update failed: {error:#}"));
    }
    log_result(&result, options.dry_run);
    result
}

/// First match wins. Lookup errors degrade to "no match" so the record is created.
pub fn remote_lookup<A: ContentReadApi>(
    api: &mut A,
    collection: &str,
    key: &MatchingKey,
) -> Option<RemoteRecord> {
    match api.find_matches(collection, key) {
        Ok(matches) => {
            if matches.len() > 1 {
                warn!(
                    collection,
                    field = %key.field,
                    value = %key.value,
                    matches = matches.len(),
                    "duplicate remote records share a matching key; using the first"
                );
            }
            matches.into_iter().next()
        }
        Err(error) => {
            warn!(
                collection,
                field = %key.field,
                value = %key.value,
                error = %format!("{error:#}"),
                "remote lookup failed; treating as no match"
            );
            None
        }
    }
}

fn log_result(result: &RecordResult, dry_run: bool) {
    match result.outcome {
        RecordOutcome::Failed => warn!(
            collection = %result.collection,
            label = %result.label,
            detail = result.detail.as_deref().unwrap_or(""),
            "record failed"
        ),
        outcome => info!(
            collection = %result.collection,
            label = %result.label,
            outcome = outcome.as_str(),
            dry_run,
            "record reconciled"
        ),
    }
}
