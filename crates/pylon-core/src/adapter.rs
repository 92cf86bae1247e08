//! Storage adapter contract.
//!
//! The pipeline never talks to a database directly. It holds one
//! [`Adapter`] in the global context and hands it to handlers. SQL backends
//! live outside this workspace; [`MemoryAdapter`] is the reference
//! implementation used in tests and development.
//!
//! Adapters report a missing table or column as
//! [`AdapterError::SchemaMismatch`], which the error reporter treats as a
//! non-fatal, always-logged condition.

use crate::response::BoxFuture;
use crate::CallError;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// A stored row.
pub type Record = Map<String, Value>;

/// Errors raised by storage adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The backing store has no such table or column.
    #[error("relation \"{model}\" does not exist: {message}")]
    SchemaMismatch {
        /// The model (table) involved.
        model: String,
        /// Backend-specific detail.
        message: String,
    },

    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl AdapterError {
    /// Creates a schema mismatch error.
    pub fn schema_mismatch(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Returns true for schema mismatches.
    #[must_use]
    pub const fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}

impl From<AdapterError> for CallError {
    fn from(error: AdapterError) -> Self {
        Self::unhandled(error)
    }
}

/// An equality condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    /// Field name.
    pub field: String,
    /// Expected value.
    pub value: Value,
}

impl Where {
    /// Creates a `field = value` condition.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn matches(&self, record: &Record) -> bool {
        record.get(&self.field) == Some(&self.value)
    }
}

/// The storage contract handed to endpoints through the global context.
pub trait Adapter: Send + Sync + 'static {
    /// Short identifier, e.g. `"memory"` or `"postgres"`.
    fn id(&self) -> &'static str;

    /// Inserts a record and returns it as stored.
    fn create<'a>(&'a self, model: &'a str, data: Record) -> BoxFuture<'a, Result<Record, AdapterError>>;

    /// Returns the first record matching every condition.
    fn find_one<'a>(
        &'a self,
        model: &'a str,
        filter: &'a [Where],
    ) -> BoxFuture<'a, Result<Option<Record>, AdapterError>>;

    /// Merges `update` into the first matching record and returns it.
    fn update<'a>(
        &'a self,
        model: &'a str,
        filter: &'a [Where],
        update: Record,
    ) -> BoxFuture<'a, Result<Option<Record>, AdapterError>>;

    /// Deletes every matching record, returning how many were removed.
    fn delete<'a>(&'a self, model: &'a str, filter: &'a [Where]) -> BoxFuture<'a, Result<u64, AdapterError>>;
}

/// In-memory adapter backed by a concurrent map of tables.
///
/// With [`MemoryAdapter::with_models`], unknown models fail with
/// [`AdapterError::SchemaMismatch`], mimicking a migrated database.
///
/// # Example
///
/// ```
/// use pylon_core::{Adapter, MemoryAdapter, Where};
///
/// # tokio_test::block_on(async {
/// let adapter = MemoryAdapter::new();
/// let mut row = serde_json::Map::new();
/// row.insert("id".into(), "u1".into());
/// adapter.create("user", row).await.unwrap();
///
/// let found = adapter.find_one("user", &[Where::eq("id", "u1")]).await.unwrap();
/// assert!(found.is_some());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: DashMap<String, Vec<Record>>,
    models: Option<HashSet<String>>,
}

impl MemoryAdapter {
    /// Creates an adapter that accepts any model name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter that only knows the given models.
    #[must_use]
    pub fn with_models<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: DashMap::new(),
            models: Some(models.into_iter().map(Into::into).collect()),
        }
    }

    fn check_model(&self, model: &str) -> Result<(), AdapterError> {
        match &self.models {
            Some(models) if !models.contains(model) => Err(AdapterError::schema_mismatch(
                model,
                "no such table",
            )),
            _ => Ok(()),
        }
    }
}

impl Adapter for MemoryAdapter {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn create<'a>(&'a self, model: &'a str, data: Record) -> BoxFuture<'a, Result<Record, AdapterError>> {
        Box::pin(async move {
            self.check_model(model)?;
            self.tables.entry(model.to_string()).or_default().push(data.clone());
            Ok(data)
        })
    }

    fn find_one<'a>(
        &'a self,
        model: &'a str,
        filter: &'a [Where],
    ) -> BoxFuture<'a, Result<Option<Record>, AdapterError>> {
        Box::pin(async move {
            self.check_model(model)?;
            Ok(self.tables.get(model).and_then(|rows| {
                rows.iter()
                    .find(|row| filter.iter().all(|w| w.matches(row)))
                    .cloned()
            }))
        })
    }

    fn update<'a>(
        &'a self,
        model: &'a str,
        filter: &'a [Where],
        update: Record,
    ) -> BoxFuture<'a, Result<Option<Record>, AdapterError>> {
        Box::pin(async move {
            self.check_model(model)?;
            let Some(mut rows) = self.tables.get_mut(model) else {
                return Ok(None);
            };
            let updated = rows
                .iter_mut()
                .find(|row| filter.iter().all(|w| w.matches(row)))
                .map(|row| {
                    row.extend(update);
                    row.clone()
                });
            Ok(updated)
        })
    }

    fn delete<'a>(&'a self, model: &'a str, filter: &'a [Where]) -> BoxFuture<'a, Result<u64, AdapterError>> {
        Box::pin(async move {
            self.check_model(model)?;
            let Some(mut rows) = self.tables.get_mut(model) else {
                return Ok(0);
            };
            let before = rows.len();
            rows.retain(|row| !filter.iter().all(|w| w.matches(row)));
            Ok((before - rows.len()) as u64)
        })
    }
}
