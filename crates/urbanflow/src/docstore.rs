//! Document store used for route history and other per-user records.
//!
//! The backend is chosen once, when the session starts, and callers only see
//! the [`DocumentStore`] trait. The local backend keeps one JSON array per
//! collection in the [`LocalStore`], newest document first.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::LocalStore;

/// Prefix of the store key holding a collection.
pub const COLLECTION_KEY_PREFIX: &str = "urbanflow_docs_";

/// Prefix of ids minted by [`LocalDocumentStore`].
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Equality filters and a limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    filters: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl DocumentQuery {
    /// A query matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep documents whose `field` equals `value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Return at most `limit` documents.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, doc: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// A store of schemaless JSON documents grouped in collections.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Save a JSON object and return its new id.
    ///
    /// The stored document gains `id` and `created` fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`] if `doc` is not an object or the
    /// collection name is empty, or an error from the backend.
    fn save(&self, collection: &str, doc: Value) -> Result<String>;

    /// Documents of a collection, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn query(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Value>>;
}

/// Documents kept in the local store.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    store: LocalStore,
}

impl LocalDocumentStore {
    /// Create a document store over `store`.
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    fn read(&self, collection: &str) -> Result<Vec<Value>> {
        let Some(raw) = self.store.get(&collection_key(collection))? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(collection, "Ignoring malformed collection: {err}");
            Vec::new()
        }))
    }
}

impl DocumentStore for LocalDocumentStore {
    fn save(&self, collection: &str, doc: Value) -> Result<String> {
        if collection.is_empty() {
            return Err(Error::InvalidDocument {
                collection: String::new(),
                message: "collection name is empty".to_string(),
            });
        }
        let Value::Object(mut fields) = doc else {
            return Err(Error::InvalidDocument {
                collection: collection.to_string(),
                message: "documents must be JSON objects".to_string(),
            });
        };

        let mut docs = self.read(collection)?;
        let id = fresh_id(&docs);
        fields.insert("id".to_string(), Value::String(id.clone()));
        fields.insert(
            "created".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        docs.insert(0, Value::Object(fields));

        self.store
            .set(&collection_key(collection), &serde_json::to_string(&docs)?)?;
        debug!(collection, %id, "Saved document");
        Ok(id)
    }

    fn query(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Value>> {
        let matching = self
            .read(collection)?
            .into_iter()
            .filter(|doc| query.matches(doc));
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}

/// Pick the document store backend for this session.
#[must_use]
pub fn open_document_store(store: &LocalStore) -> Arc<dyn DocumentStore> {
    info!("Using local document store");
    Arc::new(LocalDocumentStore::new(store.clone()))
}

fn collection_key(collection: &str) -> String {
    format!("{COLLECTION_KEY_PREFIX}{collection}")
}

fn fresh_id(existing: &[Value]) -> String {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let id = format!("{LOCAL_ID_PREFIX}{millis}");
        if !existing
            .iter()
            .any(|doc| doc.get("id").and_then(Value::as_str) == Some(id.as_str()))
        {
            return id;
        }
        millis += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_store() -> LocalDocumentStore {
        LocalDocumentStore::new(LocalStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_save_adds_id_and_created() {
        let docs = create_store();
        let id = docs.save("notes", json!({"text": "hi"})).unwrap();
        assert!(id.starts_with("local_"));

        let stored = docs.query("notes", &DocumentQuery::new()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["id"], id.as_str());
        assert_eq!(stored[0]["text"], "hi");
        let created = stored[0]["created"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created).is_ok());
    }

    #[test]
    fn test_newest_first() {
        let docs = create_store();
        docs.save("notes", json!({"n": 1})).unwrap();
        docs.save("notes", json!({"n": 2})).unwrap();

        let stored = docs.query("notes", &DocumentQuery::new()).unwrap();
        assert_eq!(stored[0]["n"], 2);
        assert_eq!(stored[1]["n"], 1);
        assert_ne!(stored[0]["id"], stored[1]["id"]);
    }

    #[test]
    fn test_filter_and_limit() {
        let docs = create_store();
        for n in 0..5 {
            let owner = if n % 2 == 0 { "a" } else { "b" };
            docs.save("notes", json!({"n": n, "owner": owner})).unwrap();
        }

        let owned = docs
            .query("notes", &DocumentQuery::new().where_eq("owner", "a"))
            .unwrap();
        assert_eq!(owned.len(), 3);

        let limited = docs
            .query("notes", &DocumentQuery::new().where_eq("owner", "a").limit(2))
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0]["n"], 4);
    }

    #[test]
    fn test_collections_are_separate() {
        let docs = create_store();
        docs.save("a", json!({})).unwrap();
        assert!(docs.query("b", &DocumentQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_objects() {
        let docs = create_store();
        let err = docs.save("notes", json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
        assert!(docs.save("", json!({})).is_err());
    }

    #[test]
    fn test_malformed_collection_reads_empty() {
        let store = LocalStore::open_in_memory().unwrap();
        store.set("urbanflow_docs_notes", "nope").unwrap();
        let docs = LocalDocumentStore::new(store);
        assert!(docs.query("notes", &DocumentQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_open_document_store() {
        let store = LocalStore::open_in_memory().unwrap();
        let docs = open_document_store(&store);
        docs.save("notes", json!({"x": 1})).unwrap();
        assert_eq!(
            LocalDocumentStore::new(store)
                .query("notes", &DocumentQuery::new())
                .unwrap()
                .len(),
            1
        );
    }
}
