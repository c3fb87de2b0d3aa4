//! Repair of rich-text block fields carrying editor state the server cannot load.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{ContentWriteApi, DEFAULT_PAGE_SIZE, fetch_all_records};
use crate::collection::resolve_matching_key;
use crate::reconcile::{RecordOutcome, SyncStats};
use crate::record::Fields;

/// Editor-session keys that must never be persisted inside a block node.
pub const EDITOR_ONLY_KEYS: &[&str] = &[
    "selection",
    "operations",
    "history",
    "lastInsertedLinkPath",
    "marks",
];

/// Strip editor-only keys from every node of a block array, recursing into `children`.
pub fn clean_blocks(value: &Value) -> Value {
    let Value::Array(blocks) = value else {
        return value.clone();
    };
    Value::Array(
        blocks
            .iter()
            .map(|block| match block {
                Value::Object(node) => {
                    let mut cleaned = node.clone();
                    for key in EDITOR_ONLY_KEYS {
                        cleaned.remove(*key);
                    }
                    if let Some(children) = cleaned.get_mut("children")
                        && children.is_array()
                    {
                        *children = clean_blocks(children);
                    }
                    Value::Object(cleaned)
                }
                other => other.clone(),
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairTarget {
    pub collection: String,
    pub singleton: bool,
    pub fields: Vec<String>,
    pub field_prefixes: Vec<String>,
}

impl RepairTarget {
    pub fn website_default() -> Vec<Self> {
        vec![
            Self {
                collection: "home".to_string(),
                singleton: true,
                fields: Vec::new(),
                field_prefixes: vec!["text_".to_string()],
            },
            Self {
                collection: "rule".to_string(),
                singleton: true,
                fields: Vec::new(),
                field_prefixes: vec!["heading_".to_string()],
            },
            Self {
                collection: "articles".to_string(),
                singleton: false,
                fields: vec!["blocks".to_string()],
                field_prefixes: Vec::new(),
            },
            Self {
                collection: "about".to_string(),
                singleton: true,
                fields: vec!["blocks".to_string()],
                field_prefixes: Vec::new(),
            },
        ]
    }

    pub fn selects(&self, field: &str) -> bool {
        self.fields.iter().any(|name| name == field)
            || self
                .field_prefixes
                .iter()
                .any(|prefix| field.starts_with(prefix.as_str()))
    }

    /// Cleaned values of the selected block fields that actually changed.
    pub fn clean_fields(&self, fields: &Fields) -> Fields {
        let mut changed = Fields::new();
        for (name, value) in fields {
            if !self.selects(name) || !value.is_array() {
                continue;
            }
            let cleaned = clean_blocks(value);
            if &cleaned != value {
                changed.insert(name.clone(), cleaned);
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepairOptions {
    pub dry_run: bool,
    pub page_size: usize,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairRecord {
    pub collection: String,
    pub label: String,
    pub outcome: RecordOutcome,
    pub cleaned_fields: Vec<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub success: bool,
    pub dry_run: bool,
    pub stats: SyncStats,
    pub records: Vec<RepairRecord>,
    pub missing: Vec<String>,
    pub errors: Vec<String>,
    pub request_count: usize,
}

pub fn repair_blocks<A: ContentWriteApi>(
    api: &mut A,
    targets: &[RepairTarget],
    options: &RepairOptions,
) -> RepairReport {
    let mut records = Vec::new();
    let mut missing = Vec::new();
    let mut errors = Vec::new();

    for target in targets {
        info!(collection = %target.collection, "repairing block fields");
        if target.singleton {
            match api.find_single(&target.collection, None) {
                Ok(Some(fields)) => {
                    let changed = target.clean_fields(&fields);
                    records.push(apply_repair(
                        api,
                        target,
                        None,
                        &target.collection,
                        changed,
                        options,
                    ));
                }
                Ok(None) => missing.push(target.collection.clone()),
                Err(error) => {
                    warn!(
                        collection = %target.collection,
                        error = %format!("{error:#}"),
                        "repair read failed"
                    );
                    errors.push(format!("{}: {error:#}", target.collection));
                }
            }
            continue;
        }

        let remote = match fetch_all_records(api, &target.collection, options.page_size, None) {
            Ok(remote) => remote,
            Err(error) => {
                warn!(
                    collection = %target.collection,
                    error = %format!("{error:#}"),
                    "repair read failed"
                );
                errors.push(format!("{}: {error:#}", target.collection));
                continue;
            }
        };
        for remote_record in remote {
            let changed = target.clean_fields(&remote_record.fields);
            let label = resolve_matching_key(&remote_record.fields, &["title", "name", "slug"])
                .map(|key| key.value)
                .unwrap_or_else(|| remote_record.id.clone());
            records.push(apply_repair(
                api,
                target,
                Some(&remote_record.id),
                &label,
                changed,
                options,
            ));
        }
    }

    let stats = SyncStats::from_outcomes(records.iter().map(|record| record.outcome));
    RepairReport {
        success: errors.is_empty() && stats.failed == 0,
        dry_run: options.dry_run,
        stats,
        records,
        missing,
        errors,
        request_count: api.request_count(),
    }
}

fn apply_repair<A: ContentWriteApi>(
    api: &mut A,
    target: &RepairTarget,
    remote_id: Option<&str>,
    label: &str,
    changed: Fields,
    options: &RepairOptions,
) -> RepairRecord {
    let mut record = RepairRecord {
        collection: target.collection.clone(),
        label: label.to_string(),
        outcome: RecordOutcome::Skipped,
        cleaned_fields: changed.keys().cloned().collect(),
        detail: None,
    };
    if changed.is_empty() {
        record.detail = Some("no editor state found".to_string());
        return record;
    }
    if options.dry_run {
        record.outcome = RecordOutcome::Updated;
        return record;
    }

    let result = match remote_id {
        Some(id) => api.update(&target.collection, id, &changed).map(|_| ()),
        None => api.update_single(&target.collection, &changed),
    };
    match result {
        Ok(()) => record.outcome = RecordOutcome::Updated,
        Err(error) => {
            record.outcome = RecordOutcome::Failed;
            record.detail = Some(format!("update failed: {error:#}"));
        }
    }
    record
}
