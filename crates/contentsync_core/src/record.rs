use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name to value mapping for one entity instance.
pub type Fields = Map<String, Value>;

/// Keys owned by the server; never part of the content a client pushes.
pub const SYSTEM_FIELDS: &[&str] = &["id", "documentId", "createdAt", "updatedAt", "publishedAt"];

/// One local record in the same `{ "data": {...} }` envelope the content API uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: Fields,
}

impl Record {
    pub fn new(data: Fields) -> Self {
        Self { data }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// A record as persisted by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: String,
    pub fields: Fields,
}

impl RemoteRecord {
    /// Parse a remote entry, preferring `documentId` over the numeric `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            bail!("remote record is not a JSON object");
        };
        let id = identifier_of(&fields)
            .ok_or_else(|| anyhow::anyhow!("remote record has neither documentId nor id"))?;
        Ok(Self { id, fields })
    }
}

fn identifier_of(fields: &Fields) -> Option<String> {
    for key in ["documentId", "id"] {
        match fields.get(key) {
            Some(Value::String(value)) if !value.trim().is_empty() => {
                return Some(value.clone());
            }
            Some(Value::Number(value)) => return Some(value.to_string()),
            _ => {}
        }
    }
    None
}

/// Load a collection export: a JSON array of `{ "data": {...} }` envelopes.
pub fn load_batch(path: &Path) -> Result<Vec<Record>> {
    let payload = read_json(path)?;
    let Value::Array(items) = payload else {
        bail!("{} must contain a JSON array of records", path.display());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            envelope_fields(item)
                .map(Record::new)
                .with_context(|| format!("invalid record #{index} in {}", path.display()))
        })
        .collect()
}

/// Load a singleton export: a single `{ "data": {...} }` envelope.
pub fn load_single(path: &Path) -> Result<Record> {
    let payload = read_json(path)?;
    envelope_fields(payload)
        .map(Record::new)
        .with_context(|| format!("invalid singleton record in {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn envelope_fields(value: Value) -> Result<Fields> {
    match value {
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Object(fields)) => Ok(fields),
            Some(_) => bail!("`data` must be a JSON object"),
            None => bail!("missing `data` envelope"),
        },
        _ => bail!("record envelope must be a JSON object"),
    }
}

/// Drop server-owned keys so an exported record can be pushed back as-is.
pub fn strip_system_fields(mut fields: Fields) -> Fields {
    for key in SYSTEM_FIELDS {
        fields.remove(*key);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn load_batch_reads_envelopes_in_order() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("categories.json");
        fs::write(
            &path,
            r#"[{"data":{"name":"Tech"}},{"data":{"name":"Life","slug":"life"}}]"#,
        )
        .expect("write batch");

        let records = load_batch(&path).expect("load batch");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field("name"), Some(&json!("Tech")));
        assert_eq!(records[1].field("slug"), Some(&json!("life")));
    }

    #[test]
    fn load_batch_names_the_bad_record() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("authors.json");
        fs::write(&path, r#"[{"data":{"name":"A"}},{"name":"B"}]"#).expect("write batch");

        let error = load_batch(&path).expect_err("must fail");
        assert!(error.to_string().contains("invalid record #1"));
    }

    #[test]
    fn load_batch_rejects_non_array_payload() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("articles.json");
        fs::write(&path, r#"{"data":{"title":"x"}}"#).expect("write batch");

        let error = load_batch(&path).expect_err("must fail");
        assert!(error.to_string().contains("JSON array"));
    }

    #[test]
    fn load_single_unwraps_envelope() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("global.json");
        fs::write(&path, r#"{"data":{"siteName":"Blog"}}"#).expect("write single");

        let record = load_single(&path).expect("load single");
        assert_eq!(record.field("siteName"), Some(&json!("Blog")));
    }

    #[test]
    fn remote_record_prefers_document_id() {
        let record = RemoteRecord::from_value(json!({"id": 7, "documentId": "abc", "name": "Tech"}))
            .expect("parse");
        assert_eq!(record.id, "abc");

        let legacy = RemoteRecord::from_value(json!({"id": 7, "name": "Tech"})).expect("parse");
        assert_eq!(legacy.id, "7");

        assert!(RemoteRecord::from_value(json!({"name": "Tech"})).is_err());
    }

    #[test]
    fn strip_system_fields_keeps_content() {
        let Value::Object(fields) = json!({
            "id": 1,
            "documentId": "d1",
            "createdAt": "2026-01-01",
            "updatedAt": "2026-01-02",
            "publishedAt": null,
            "title": "Hello"
        }) else {
            unreachable!()
        };
        let stripped = strip_system_fields(fields);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped.get("title"), Some(&json!("Hello")));
    }
}
