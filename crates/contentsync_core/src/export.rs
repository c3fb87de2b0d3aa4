use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::blocks::RepairTarget;
use crate::client::{ContentReadApi, DEFAULT_PAGE_SIZE, fetch_all_records};
use crate::collection::{CollectionSpec, SyncPlan};
use crate::record::{Fields, Record, strip_system_fields};

pub const SUMMARY_FILENAME: &str = "export-summary.json";
pub const MEDIA_FILENAME: &str = "media.json";
const MEDIA_ENTRY: &str = "media";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub page_size: usize,
    pub populate: Option<String>,
    /// Block fields selected by these targets are cleaned before writing.
    pub clean_blocks: Vec<RepairTarget>,
    /// Also write upload metadata to `media.json`.
    pub include_media: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            populate: Some("*".to_string()),
            clean_blocks: Vec::new(),
            include_media: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedCollection {
    pub name: String,
    pub file: String,
    pub singleton: bool,
    pub records: usize,
    pub cleaned_records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub exports_dir: String,
    pub exported_at_unix: u64,
    pub collections: Vec<ExportedCollection>,
    pub media_files: Option<usize>,
    pub missing: Vec<String>,
    pub request_count: usize,
}

#[derive(Debug, Serialize)]
struct ExportSummary<'a> {
    exported_at_unix: u64,
    counts: BTreeMap<&'a str, usize>,
    files: BTreeMap<&'a str, &'a str>,
    missing: &'a [String],
}

enum Pulled {
    Many(Vec<Record>),
    Single(Record),
}

/// Pull every collection of the plan into `<exports_dir>/<file>`, in the layout sync reads.
///
/// Everything is read before anything is written, so a failed read leaves the
/// previous export untouched.
pub fn export_collections<A: ContentReadApi>(
    api: &mut A,
    plan: &SyncPlan,
    exports_dir: &Path,
    options: &ExportOptions,
) -> Result<ExportReport> {
    let mut pulled = Vec::new();
    let mut missing = Vec::new();

    for spec in plan.collections() {
        info!(collection = %spec.name, "exporting collection");
        if spec.is_singleton() {
            let fields = api
                .find_single(&spec.name, options.populate.as_deref())
                .with_context(|| format!("failed to export {}", spec.name))?;
            match fields {
                Some(fields) => pulled.push((spec, Pulled::Single(Record::new(fields)))),
                None => missing.push(spec.name.clone()),
            }
            continue;
        }

        let remote = fetch_all_records(
            api,
            &spec.name,
            options.page_size,
            options.populate.as_deref(),
        )
        .with_context(|| format!("failed to export {}", spec.name))?;
        let records = remote
            .into_iter()
            .map(|record| Record::new(record.fields))
            .collect();
        pulled.push((spec, Pulled::Many(records)));
    }

    let mut media: Option<Vec<Value>> = None;
    if options.include_media {
        info!("exporting media metadata");
        match api.find_media().context("failed to export media")? {
            Some(files) => media = Some(files),
            None => missing.push(MEDIA_ENTRY.to_string()),
        }
    }

    fs::create_dir_all(exports_dir)
        .with_context(|| format!("failed to create {}", exports_dir.display()))?;

    let mut collections = Vec::with_capacity(pulled.len());
    for (spec, content) in pulled {
        let (payload, exported) = match content {
            Pulled::Many(records) => {
                let mut cleaned_records = 0;
                let prepared = records
                    .into_iter()
                    .map(|record| {
                        let (fields, cleaned) = prepare_fields(spec, record.data, options);
                        cleaned_records += usize::from(cleaned);
                        Record::new(fields)
                    })
                    .collect::<Vec<_>>();
                let summary = exported_collection(spec, prepared.len(), cleaned_records);
                (serde_json::to_string_pretty(&prepared)?, summary)
            }
            Pulled::Single(record) => {
                let (fields, cleaned) = prepare_fields(spec, record.data, options);
                let summary = exported_collection(spec, 1, usize::from(cleaned));
                (serde_json::to_string_pretty(&Record::new(fields))?, summary)
            }
        };

        let path = exports_dir.join(&spec.file);
        fs::write(&path, payload).with_context(|| format!("failed to write {}", path.display()))?;
        info!(collection = %spec.name, records = exported.records, "exported");
        collections.push(exported);
    }

    let media_files = match &media {
        Some(files) => {
            let path = exports_dir.join(MEDIA_FILENAME);
            fs::write(&path, serde_json::to_string_pretty(files)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(files = files.len(), "exported media metadata");
            Some(files.len())
        }
        None => None,
    };

    let exported_at_unix = unix_timestamp()?;
    let mut summary = ExportSummary {
        exported_at_unix,
        counts: collections
            .iter()
            .map(|item| (item.name.as_str(), item.records))
            .collect(),
        files: collections
            .iter()
            .map(|item| (item.name.as_str(), item.file.as_str()))
            .collect(),
        missing: &missing,
    };
    if let Some(count) = media_files {
        summary.counts.insert(MEDIA_ENTRY, count);
        summary.files.insert(MEDIA_ENTRY, MEDIA_FILENAME);
    }
    let summary_path = exports_dir.join(SUMMARY_FILENAME);
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;

    Ok(ExportReport {
        exports_dir: exports_dir.to_string_lossy().replace('\\', "/"),
        exported_at_unix,
        collections,
        media_files,
        missing,
        request_count: api.request_count(),
    })
}

fn prepare_fields(spec: &CollectionSpec, fields: Fields, options: &ExportOptions) -> (Fields, bool) {
    let mut fields = strip_system_fields(fields);
    let mut cleaned = false;
    for target in options
        .clean_blocks
        .iter()
        .filter(|target| target.collection == spec.name)
    {
        let changed = target.clean_fields(&fields);
        cleaned |= !changed.is_empty();
        fields.extend(changed);
    }
    (fields, cleaned)
}

fn exported_collection(spec: &CollectionSpec, records: usize, cleaned_records: usize) -> ExportedCollection {
    ExportedCollection {
        name: spec.name.clone(),
        file: spec.file.clone(),
        singleton: spec.is_singleton(),
        records,
        cleaned_records,
    }
}

fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")
        .map(|duration| duration.as_secs())
}
