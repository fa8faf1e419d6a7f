//! Record repository: maps listing queries and request bodies onto store
//! operations and shapes the results for the HTTP layer.
//!
//! PUT, PATCH and DELETE are check-then-write: an existence check followed by
//! a separate write. Concurrent requests on the same id can interleave
//! between the two calls (a delete racing a PUT can end in a replace of a
//! just-deleted record, for example). This is a known limitation.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::ApiError;
use crate::query::{coerce_int, parse_nested, Filter, Sort};
use crate::storage::{Document, FindOptions, ObjectId, Storage, StoreError};

/// Fixed listing page size.
pub const PAGE_SIZE: usize = 10;

/// Listing request decoded from the query string.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Raw `filter` object, echoed back in metadata.
    pub filter: Value,
    /// Raw `sort` object; directions are coerced when listing.
    pub sort: Value,
    pub page: Option<Value>,
}

impl ListQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut params = parse_nested(pairs);
        Self {
            filter: take_or_empty(&mut params, "filter"),
            sort: take_or_empty(&mut params, "sort"),
            page: params.remove("page"),
        }
    }

    /// Page number: leading integer of the raw value, 1 when absent,
    /// unparsable or below 1.
    pub fn page_number(&self) -> i64 {
        self.page
            .as_ref()
            .and_then(coerce_int)
            .filter(|&page| page >= 1)
            .unwrap_or(1)
    }
}

// Saturates for pages past the addressable range; those pages are empty.
fn skip_for(page: i64) -> usize {
    usize::try_from(page - 1)
        .ok()
        .and_then(|p| p.checked_mul(PAGE_SIZE))
        .unwrap_or(usize::MAX)
}

// Absent or empty-string parameters behave like `{}`.
fn take_or_empty(params: &mut Map<String, Value>, key: &str) -> Value {
    match params.remove(key) {
        None => Value::Object(Map::new()),
        Some(Value::String(s)) if s.is_empty() => Value::Object(Map::new()),
        Some(value) => value,
    }
}

/// Listing metadata. `total` counts the items in this page only, not the
/// whole collection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListMeta {
    pub skip: usize,
    pub limit: usize,
    pub sort: Value,
    pub filter: Value,
    pub page: i64,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub meta: ListMeta,
    pub items: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// Existing record fully replaced (200).
    Replaced(Document),
    /// No record had the id; the body was inserted under a new id (201).
    Inserted(Document),
}

#[derive(Clone)]
pub struct RecordRepository {
    storage: Arc<Storage>,
}

impl RecordRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn list(&self, query: &ListQuery) -> Result<ListPage, StoreError> {
        let page = query.page_number();
        let skip = skip_for(page);
        let filter = Filter::compile(&query.filter)?;
        let sort = Sort::from_value(&query.sort);

        let items = self.storage.find(&FindOptions {
            filter,
            sort: sort.clone(),
            skip,
            limit: PAGE_SIZE,
        })?;

        Ok(ListPage {
            meta: ListMeta {
                skip,
                limit: PAGE_SIZE,
                sort: sort.to_value(),
                filter: query.filter.clone(),
                page,
                total: items.len(),
            },
            items,
        })
    }

    pub fn create(&self, body: Document) -> Result<Document, StoreError> {
        self.storage.insert(body)
    }

    pub fn upsert_by_id(&self, id: &ObjectId, body: Document) -> Result<UpsertOutcome, StoreError> {
        if self.storage.contains(id)? {
            Ok(UpsertOutcome::Replaced(self.storage.replace(id, body)?))
        } else {
            Ok(UpsertOutcome::Inserted(self.storage.insert(body)?))
        }
    }

    pub fn patch_by_id(&self, id: &ObjectId, partial: Document) -> Result<Document, ApiError> {
        if !self.storage.contains(id)? {
            return Err(ApiError::NotFound);
        }
        // Deleted between the check and the write.
        self.storage.set_fields(id, partial)?.ok_or(ApiError::NotFound)
    }

    pub fn delete_by_id(&self, id: &ObjectId) -> Result<(), ApiError> {
        if !self.storage.contains(id)? {
            return Err(ApiError::NotFound);
        }
        self.storage.remove(id)?;
        Ok(())
    }
}
