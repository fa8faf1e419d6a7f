use serde_json::{Map, Value};
use sled::Db;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::query::{Filter, QueryError, Sort};

/// Schema-less travel record as stored in the collection.
pub type Document = Map<String, Value>;

/// Name of the identifier field the store assigns on insert.
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("invalid query: {0}")]
    Query(#[from] QueryError),
    #[error("stored document {0} is not a JSON object")]
    Corrupt(String),
}

/// Store-assigned record identifier: 24 lowercase hex characters.
///
/// The first 8 characters are the insert time in seconds, the remaining 16
/// a counter sled guarantees unique for the lifetime of the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    pub const LEN: usize = 24;

    /// Accepts any 24-character hex string, normalising to lowercase.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    fn from_parts(seconds: u32, counter: u64) -> Self {
        Self(format!("{:08x}{:016x}", seconds, counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for [`Storage::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Filter,
    pub sort: Sort,
    pub skip: usize,
    pub limit: usize,
}

/// Sled-backed document collection for travel records.
///
/// Each operation here is a single store call. Callers that combine them
/// (check-then-write) get no atomicity across calls.
#[derive(Clone)] // Clone shares the same sled handles
pub struct Storage {
    db: Db,
    records: sled::Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop (tests, dry runs).
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let records = db.open_tree("records")?;
        Ok(Self { db, records })
    }

    fn generate_id(&self) -> Result<ObjectId, StoreError> {
        let seconds = chrono::Utc::now().timestamp() as u32;
        let counter = self.db.generate_id()?;
        Ok(ObjectId::from_parts(seconds, counter))
    }

    /// Insert a new document under a freshly assigned `_id`.
    /// Any `_id` the caller supplied is discarded.
    pub fn insert(&self, body: Document) -> Result<Document, StoreError> {
        let id = self.generate_id()?;
        let doc = with_id(&id, body);
        self.records.insert(id.as_str(), serde_json::to_vec(&doc)?)?;
        Ok(doc)
    }

    pub fn get(&self, id: &ObjectId) -> Result<Option<Document>, StoreError> {
        match self.records.get(id.as_str())? {
            Some(bytes) => Ok(Some(decode(id.as_str(), &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(id.as_str())?)
    }

    /// Filter, sort, then apply skip/limit. Without an ordering sort key the
    /// scan stops as soon as the page is full; documents come back in id order.
    pub fn find(&self, options: &FindOptions) -> Result<Vec<Document>, StoreError> {
        if !options.sort.is_ordering() {
            let mut page = Vec::new();
            let mut skipped = 0;
            for item in self.records.iter() {
                if page.len() >= options.limit {
                    break;
                }
                let (key, value) = item?;
                let doc = decode(&String::from_utf8_lossy(&key), &value)?;
                if !options.filter.matches(&doc) {
                    continue;
                }
                if skipped < options.skip {
                    skipped += 1;
                    continue;
                }
                page.push(doc);
            }
            return Ok(page);
        }

        let mut matching = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item?;
            let doc = decode(&String::from_utf8_lossy(&key), &value)?;
            if options.filter.matches(&doc) {
                matching.push(doc);
            }
        }
        // Stable: ties keep id order.
        matching.sort_by(|a, b| options.sort.compare(a, b));
        Ok(matching
            .into_iter()
            .skip(options.skip)
            .take(options.limit)
            .collect())
    }

    /// Overwrite the document stored under `id` with `{_id: id, ...body}`.
    pub fn replace(&self, id: &ObjectId, body: Document) -> Result<Document, StoreError> {
        let doc = with_id(id, body);
        self.records.insert(id.as_str(), serde_json::to_vec(&doc)?)?;
        Ok(doc)
    }

    /// Shallow field-level set. Returns `None` when no document has `id`.
    /// `_id` is never touched.
    pub fn set_fields(&self, id: &ObjectId, fields: Document) -> Result<Option<Document>, StoreError> {
        let updated = self.records.update_and_fetch(id.as_str(), |current| {
            let current = current?;
            let mut doc: Document = match serde_json::from_slice(current) {
                Ok(doc) => doc,
                // Leave undecodable bytes alone; decode below reports them.
                Err(_) => return Some(current.to_vec()),
            };
            for (key, value) in &fields {
                if key != ID_FIELD {
                    doc.insert(key.clone(), value.clone());
                }
            }
            serde_json::to_vec(&doc).ok().or_else(|| Some(current.to_vec()))
        })?;

        match updated {
            Some(bytes) => Ok(Some(decode(id.as_str(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns whether a document was removed.
    pub fn remove(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.records.remove(id.as_str())?.is_some())
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.db.flush()?)
    }
}

fn with_id(id: &ObjectId, body: Document) -> Document {
    let mut doc = Document::new();
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    for (key, value) in body {
        if key != ID_FIELD {
            doc.insert(key, value);
        }
    }
    doc
}

fn decode(key: &str, bytes: &[u8]) -> Result<Document, StoreError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::Corrupt(key.to_string())),
    }
}
