//! # contract: the remote instance as seen by the reconciliation engine
//!
//! This module defines the closed set of resource kinds, the collection endpoints they live
//! behind, and the single async trait ([`ResourceAdapter`]) through which every read and write
//! against the remote instance goes.
//!
//! ## Interface & Extensibility
//! - Implement [`ResourceAdapter`] to point the engine at a concrete transport (the binary crate
//!   ships a Directus REST client).
//! - `list` returns exactly one page; callers page to exhaustion via [`crate::paginate`].
//! - Schema methods are opaque passthroughs: the engine never looks inside the blobs.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so `MockResourceAdapter` is available in tests and to
//!   downstream crates through the `test-export-mocks` feature.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TransportError, ValidationError};

/// A single remote resource: a field to value map.
pub type Record = serde_json::Map<String, Value>;

/// The resource kinds the engine knows how to snapshot and reconcile.
///
/// Deserialisation goes through [`FromStr`], so letter case is ignored there too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ResourceKind {
    Schema,
    Translations,
    Permissions,
    Folders,
}

impl ResourceKind {
    /// Every kind, in canonical processing order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Schema,
        ResourceKind::Translations,
        ResourceKind::Permissions,
        ResourceKind::Folders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Schema => "schema",
            ResourceKind::Translations => "translations",
            ResourceKind::Permissions => "permissions",
            ResourceKind::Folders => "folders",
        }
    }

    /// Name of the snapshot document holding this kind.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownKind {
                value: s.to_string(),
                allowed: ResourceKind::ALL
                    .iter()
                    .map(ResourceKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Remote collections the record-shaped kinds are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Folders,
    Roles,
    Permissions,
    Translations,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Folders => "folders",
            Endpoint::Roles => "roles",
            Endpoint::Permissions => "permissions",
            Endpoint::Translations => "translations",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Parameters for one page of a `list` call. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListQuery {
    pub page: u32,
    pub limit: Option<u32>,
    pub sort: Vec<String>,
    pub fields: Vec<String>,
    pub filter: Option<Value>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    pub fn sort(mut self, field: &str) -> Self {
        self.sort.push(field.to_string());
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Option<Value>) -> Self {
        self.filter = filter;
        self
    }

    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// Stable remote identifier.
///
/// Remote ids come back either as strings (uuids) or integers; equality and hashing use the
/// textual form while the original JSON value is kept for payloads.
#[derive(Debug, Clone)]
pub struct RecordId {
    key: String,
    raw: Value,
}

impl RecordId {
    /// Returns `None` for null, empty strings and non-scalar values.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self {
                key: s.clone(),
                raw: value.clone(),
            }),
            Value::Number(n) => Some(Self {
                key: n.to_string(),
                raw: value.clone(),
            }),
            _ => None,
        }
    }

    /// The explicit `id` of a record, if it carries one.
    pub fn of(record: &Record) -> Option<Self> {
        record.get("id").and_then(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn to_value(&self) -> Value {
        self.raw.clone()
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self {
            key: s.to_string(),
            raw: Value::String(s.to_string()),
        }
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RecordId {}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Everything the engine needs from the remote instance.
///
/// Implementations own authentication and transport; the engine only sees records and
/// [`TransportError`]s. The trait is `Send + Sync` so one adapter can be borrowed by every
/// concurrently running kind.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Fetch a single page of records. An empty page marks the end of the collection.
    async fn list(&self, endpoint: Endpoint, query: ListQuery)
        -> Result<Vec<Record>, TransportError>;

    /// Create a record and return it with its assigned id.
    async fn create(&self, endpoint: Endpoint, record: Record) -> Result<Record, TransportError>;

    /// Apply a partial update to the record with the given id.
    async fn update(
        &self,
        endpoint: Endpoint,
        id: RecordId,
        patch: Record,
    ) -> Result<Record, TransportError>;

    async fn delete(&self, endpoint: Endpoint, id: RecordId) -> Result<(), TransportError>;

    /// Export the remote schema as an opaque document.
    async fn schema_snapshot(&self) -> Result<Value, TransportError>;

    /// Ask the remote to diff a schema document against its live schema.
    async fn schema_diff(&self, snapshot: Value) -> Result<Value, TransportError>;

    /// Apply a diff previously produced by [`ResourceAdapter::schema_diff`].
    async fn schema_apply(&self, diff: Value) -> Result<Value, TransportError>;
}
