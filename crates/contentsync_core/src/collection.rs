use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;

use crate::record::Fields;

/// Field and value used to find the remote counterpart of a local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchingKey {
    pub field: String,
    pub value: String,
}

/// Return the first candidate field carrying a usable, non-empty value.
pub fn resolve_matching_key<S: AsRef<str>>(fields: &Fields, candidates: &[S]) -> Option<MatchingKey> {
    candidates.iter().find_map(|candidate| {
        let field = candidate.as_ref();
        key_value(fields.get(field)?).map(|value| MatchingKey {
            field: field.to_string(),
            value,
        })
    })
}

fn key_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// How a collection derives the matching key of its records.
#[derive(Debug, Clone)]
pub enum KeyPolicy {
    /// Candidate fields in priority order.
    Fields(Vec<String>),
    Custom(fn(&Fields) -> Option<MatchingKey>),
}

impl KeyPolicy {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(names.into_iter().map(Into::into).collect())
    }

    pub fn resolve(&self, fields: &Fields) -> Option<MatchingKey> {
        match self {
            Self::Fields(candidates) => resolve_matching_key(fields, candidates),
            Self::Custom(extract) => extract(fields),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Fields(candidates) => candidates.join(" > "),
            Self::Custom(_) => "<custom>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CollectionKind {
    /// Many entries, create-or-update by matching key.
    Collection { key: KeyPolicy },
    /// Exactly one entry, always updated in place.
    Singleton,
}

#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub file: String,
    pub kind: CollectionKind,
    pub depends_on: BTreeSet<String>,
}

impl CollectionSpec {
    pub fn collection(name: &str, key: KeyPolicy) -> Self {
        Self {
            name: name.to_string(),
            file: default_file_name(name),
            kind: CollectionKind::Collection { key },
            depends_on: BTreeSet::new(),
        }
    }

    pub fn singleton(name: &str) -> Self {
        Self {
            name: name.to_string(),
            file: default_file_name(name),
            kind: CollectionKind::Singleton,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.kind, CollectionKind::Singleton)
    }
}

pub fn default_file_name(name: &str) -> String {
    format!("{name}.json")
}

/// Validated collections in dependency-respecting execution order.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    ordered: Vec<CollectionSpec>,
}

impl SyncPlan {
    pub fn new(specs: Vec<CollectionSpec>) -> Result<Self> {
        let mut names = BTreeSet::new();
        for spec in &specs {
            if spec.name.trim().is_empty() {
                bail!("collection name cannot be empty");
            }
            if !names.insert(spec.name.clone()) {
                bail!("collection `{}` is declared more than once", spec.name);
            }
        }
        for spec in &specs {
            for dependency in &spec.depends_on {
                if dependency == &spec.name {
                    bail!("collection `{}` depends on itself", spec.name);
                }
                if !names.contains(dependency) {
                    bail!(
                        "collection `{}` depends on undeclared collection `{dependency}`",
                        spec.name
                    );
                }
            }
        }

        Ok(Self {
            ordered: stable_topological_order(specs)?,
        })
    }

    /// The default website content model.
    pub fn website_default() -> Self {
        let specs = vec![
            CollectionSpec::collection("categories", KeyPolicy::fields(["name"])),
            CollectionSpec::collection("authors", KeyPolicy::fields(["name"])),
            CollectionSpec::collection("articles", KeyPolicy::fields(["slug", "title"]))
                .depends_on(["categories", "authors"]),
            CollectionSpec::singleton("global"),
            CollectionSpec::singleton("about"),
            CollectionSpec::singleton("home"),
        ];
        Self { ordered: specs }
    }

    /// Keep only the named collections, in plan order.
    pub fn only(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        let wanted = names.iter().map(String::as_str).collect::<BTreeSet<_>>();
        for name in &wanted {
            if self.get(name).is_none() {
                bail!("unknown collection `{name}`");
            }
        }
        let ordered = self
            .ordered
            .iter()
            .filter(|spec| wanted.contains(spec.name.as_str()))
            .cloned()
            .collect();
        Ok(Self { ordered })
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSpec> {
        self.ordered.iter().find(|spec| spec.name == name)
    }

    pub fn collections(&self) -> &[CollectionSpec] {
        &self.ordered
    }

    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|spec| spec.name.as_str()).collect()
    }
}

/// Kahn's algorithm that always picks the earliest declared ready collection.
fn stable_topological_order(specs: Vec<CollectionSpec>) -> Result<Vec<CollectionSpec>> {
    let mut pending: BTreeMap<String, BTreeSet<String>> = specs
        .iter()
        .map(|spec| (spec.name.clone(), spec.depends_on.clone()))
        .collect();
    let mut remaining = specs;
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let Some(position) = remaining.iter().position(|spec| {
            pending
                .get(&spec.name)
                .is_some_and(|dependencies| dependencies.is_empty())
        }) else {
            let stuck = remaining
                .iter()
                .map(|spec| spec.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            bail!("dependency cycle between collections: {stuck}");
        };

        let spec = remaining.remove(position);
        pending.remove(&spec.name);
        for dependencies in pending.values_mut() {
            dependencies.remove(&spec.name);
        }
        ordered.push(spec);
    }

    Ok(ordered)
}
