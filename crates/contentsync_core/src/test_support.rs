use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use serde_json::Value;

use crate::client::{ContentReadApi, ContentWriteApi, PageQuery, RemotePage};
use crate::collection::MatchingKey;
use crate::record::{Fields, Record, RemoteRecord};

pub(crate) fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

pub(crate) fn record(value: Value) -> Record {
    Record::new(fields(value))
}

/// In-memory content store that counts calls and can be told to fail.
#[derive(Default)]
pub(crate) struct MockApi {
    pub collections: BTreeMap<String, Vec<RemoteRecord>>,
    pub singletons: BTreeMap<String, Fields>,
    pub lookups: Vec<(String, MatchingKey)>,
    pub writes: Vec<String>,
    /// Writes carrying any of these string values are rejected.
    pub reject_values: BTreeSet<String>,
    pub fail_lookups: bool,
    pub fail_reads: BTreeSet<String>,
    pub media: Option<Vec<Value>>,
    next_id: usize,
    request_count: usize,
}

impl MockApi {
    pub fn seed(&mut self, collection: &str, data: Value) -> String {
        self.next_id += 1;
        let id = format!("doc{}", self.next_id);
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(RemoteRecord {
                id: id.clone(),
                fields: fields(data),
            });
        id
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }

    pub fn count_with(&self, collection: &str, field: &str, value: &str) -> usize {
        self.collections.get(collection).map_or(0, |records| {
            records
                .iter()
                .filter(|record| record.fields.get(field).and_then(Value::as_str) == Some(value))
                .count()
        })
    }

    pub fn mutation_count(&self) -> usize {
        self.writes.len()
    }

    fn check_write(&self, fields: &Fields) -> Result<()> {
        for value in fields.values() {
            if let Some(text) = value.as_str()
                && self.reject_values.contains(text)
            {
                bail!("HTTP 400 Bad Request: ValidationError: rejected {text}");
            }
        }
        Ok(())
    }
}

fn matches_key(fields: &Fields, key: &MatchingKey) -> bool {
    match fields.get(&key.field) {
        Some(Value::String(text)) => text == &key.value,
        Some(Value::Number(number)) => number.to_string() == key.value,
        Some(Value::Bool(flag)) => flag.to_string() == key.value,
        _ => false,
    }
}

impl ContentReadApi for MockApi {
    fn find_matches(&mut self, collection: &str, key: &MatchingKey) -> Result<Vec<RemoteRecord>> {
        self.request_count += 1;
        self.lookups.push((collection.to_string(), key.clone()));
        if self.fail_lookups {
            bail!("connection refused");
        }
        Ok(self
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches_key(&record.fields, key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_page(&mut self, collection: &str, query: &PageQuery) -> Result<RemotePage> {
        self.request_count += 1;
        if self.fail_reads.contains(collection) {
            bail!("GET {collection} failed with HTTP 500 Internal Server Error");
        }
        let records = self.collections.get(collection).cloned().unwrap_or_default();
        let page_size = query.page_size.max(1);
        let page_count = records.len().div_ceil(page_size).max(1);
        let start = (query.page.saturating_sub(1)) * page_size;
        Ok(RemotePage {
            records: records.into_iter().skip(start).take(page_size).collect(),
            page: query.page,
            page_count,
        })
    }

    fn find_single(&mut self, singleton: &str, _populate: Option<&str>) -> Result<Option<Fields>> {
        self.request_count += 1;
        if self.fail_reads.contains(singleton) {
            bail!("GET {singleton} failed with HTTP 500 Internal Server Error");
        }
        Ok(self.singletons.get(singleton).cloned())
    }

    fn find_media(&mut self) -> Result<Option<Vec<Value>>> {
        self.request_count += 1;
        if self.fail_reads.contains("media") {
            bail!("GET upload/files failed with HTTP 500 Internal Server Error");
        }
        Ok(self.media.clone())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl ContentWriteApi for MockApi {
    fn create(&mut self, collection: &str, fields: &Fields) -> Result<Option<String>> {
        self.request_count += 1;
        self.writes.push(format!("POST {collection}"));
        self.check_write(fields)?;
        let id = self.seed(collection, Value::Object(fields.clone()));
        Ok(Some(id))
    }

    fn update(&mut self, collection: &str, id: &str, fields: &Fields) -> Result<Option<String>> {
        self.request_count += 1;
        self.writes.push(format!("PUT {collection}/{id}"));
        self.check_write(fields)?;
        let Some(existing) = self
            .collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|record| record.id == id))
        else {
            bail!("HTTP 404 Not Found");
        };
        for (key, value) in fields {
            existing.fields.insert(key.clone(), value.clone());
        }
        Ok(Some(id.to_string()))
    }

    fn update_single(&mut self, singleton: &str, fields: &Fields) -> Result<()> {
        self.request_count += 1;
        self.writes.push(format!("PUT {singleton}"));
        self.check_write(fields)?;
        let entry = self.singletons.entry(singleton.to_string()).or_default();
        for (key, value) in fields {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
