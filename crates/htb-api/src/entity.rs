//! Lazy summary-to-detail hydration shared by every entity kind
//!
//! List and search endpoints return summaries carrying only an entity's common
//! fields. A [`LazyEntity`] built from one hydrates itself on first access to
//! its detail by refetching the full record through the owning client. The
//! refetch happens at most once per instance.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use htb_core::{HtbError, Result};

use crate::client::SessionRef;

/// How an entity is looked up on its single-item endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(u64),
    /// Machines and challenges can also be fetched by name
    Name(String),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for Lookup {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for Lookup {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Lookup {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// A parsed record: id, common fields and, for full records, the detail
pub struct Parsed<K: EntityKind> {
    pub id: u64,
    pub common: K::Common,
    pub detail: Option<K::Detail>,
}

/// Description of one entity kind
///
/// `DETAILED_FIELDS` must list exactly the keys `Detail` serializes to.
pub trait EntityKind: Send + Sync + 'static {
    const NAME: &'static str;
    const DETAILED_FIELDS: &'static [&'static str];

    /// Fields present on summaries and full records alike
    type Common: Serialize + Clone + fmt::Debug + Send + Sync;
    /// Fields only present on full records
    type Detail: Serialize + Clone + fmt::Debug + Send + Sync;

    /// Single-item endpoint, relative to the API base
    fn endpoint(lookup: &Lookup) -> String;

    /// Extract the record from a single-item response body
    fn unwrap_response(body: Value) -> Result<Value>;

    /// Parse a raw record; summaries carry no detail
    fn parse(record: Value, summary: bool) -> Result<Parsed<Self>>
    where
        Self: Sized;
}

/// Identity of an entity across kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: &'static str,
    pub id: u64,
}

/// An entity that may still need its detail fetched
pub struct LazyEntity<K: EntityKind> {
    id: u64,
    common: K::Common,
    detail: OnceCell<K::Detail>,
    session: SessionRef,
}

impl<K: EntityKind> LazyEntity<K> {
    pub fn new(parsed: Parsed<K>, session: SessionRef) -> Self {
        Self {
            id: parsed.id,
            common: parsed.common,
            detail: OnceCell::new_with(parsed.detail),
            session,
        }
    }

    /// Build from a raw record
    pub fn from_record(record: Value, summary: bool, session: SessionRef) -> Result<Self> {
        Ok(Self::new(K::parse(record, summary)?, session))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            kind: K::NAME,
            id: self.id,
        }
    }

    pub fn common(&self) -> &K::Common {
        &self.common
    }

    /// Whether the detail has not been loaded yet
    pub fn is_summary(&self) -> bool {
        !self.detail.initialized()
    }

    /// Detail if already loaded, without fetching
    pub fn loaded_detail(&self) -> Option<&K::Detail> {
        self.detail.get()
    }

    /// Detail fields, refetching the full record once if this is a summary
    ///
    /// A failed refetch leaves the instance a summary; a later call retries.
    pub async fn detail(&self) -> Result<&K::Detail> {
        self.detail
            .get_or_try_init(|| async {
                let client = self.session.upgrade()?;
                debug!("Hydrating {} {}", K::NAME, self.id);
                let full = client.fetch::<K>(Lookup::Id(self.id)).await?;
                full.into_detail().ok_or_else(|| {
                    HtbError::Api(format!("{} {} came back without detail", K::NAME, self.id))
                })
            })
            .await
    }

    /// Make sure the detail is loaded
    pub async fn hydrate(&self) -> Result<()> {
        self.detail().await.map(|_| ())
    }

    /// Read a field by name
    ///
    /// `id` and common fields are returned directly. A declared detailed field
    /// hydrates the instance first. Anything else is an `UnknownField` error.
    pub async fn get(&self, field: &str) -> Result<Value> {
        if field == "id" {
            return Ok(Value::from(self.id));
        }
        if let Some(value) = field_of(&self.common, field)? {
            return Ok(value);
        }
        if K::DETAILED_FIELDS.contains(&field) {
            let detail = self.detail().await?;
            return Ok(field_of(detail, field)?.unwrap_or(Value::Null));
        }

        Err(HtbError::UnknownField {
            kind: K::NAME,
            field: field.to_string(),
        })
    }

    /// Everything currently known as one JSON object
    pub fn to_json(&self) -> Result<Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::from(self.id));
        merge(&mut map, &self.common)?;
        if let Some(detail) = self.detail.get() {
            merge(&mut map, detail)?;
        }
        Ok(Value::Object(map))
    }

    pub(crate) fn session(&self) -> &SessionRef {
        &self.session
    }

    fn into_detail(self) -> Option<K::Detail> {
        self.detail.into_inner()
    }
}

fn field_of<T: Serialize>(value: &T, field: &str) -> Result<Option<Value>> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => Ok(map.remove(field)),
        _ => Ok(None),
    }
}

fn merge<T: Serialize>(map: &mut Map<String, Value>, value: &T) -> Result<()> {
    if let Value::Object(fields) = serde_json::to_value(value)? {
        map.extend(fields);
    }
    Ok(())
}

impl<K: EntityKind> Deref for LazyEntity<K> {
    type Target = K::Common;

    fn deref(&self) -> &Self::Target {
        &self.common
    }
}

impl<K: EntityKind> Clone for LazyEntity<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            common: self.common.clone(),
            detail: self.detail.clone(),
            session: self.session.clone(),
        }
    }
}

impl<K: EntityKind> fmt::Debug for LazyEntity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("id", &self.id)
            .field("summary", &self.is_summary())
            .field("common", &self.common)
            .field("detail", &self.detail.get())
            .finish()
    }
}

/// Same kind and same id, regardless of hydration
impl<K: EntityKind> PartialEq for LazyEntity<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K: EntityKind> Eq for LazyEntity<K> {}

impl<K: EntityKind> Hash for LazyEntity<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Ids resolved into entities on first use
///
/// Ids that no longer exist (404) are skipped rather than failing the batch.
pub(crate) struct IdBatch<K: EntityKind> {
    ids: Vec<u64>,
    resolved: OnceCell<Vec<LazyEntity<K>>>,
}

impl<K: EntityKind> IdBatch<K> {
    pub(crate) fn new(ids: Vec<u64>) -> Self {
        Self {
            ids,
            resolved: OnceCell::new(),
        }
    }

    pub(crate) fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub(crate) async fn resolve(&self, session: &SessionRef) -> Result<&[LazyEntity<K>]> {
        let items = self
            .resolved
            .get_or_try_init(|| async {
                let client = session.upgrade()?;
                let mut items = Vec::with_capacity(self.ids.len());
                for &id in &self.ids {
                    match client.fetch::<K>(id).await {
                        Ok(entity) => items.push(entity),
                        Err(e) if e.is_not_found() => {
                            debug!("Skipping missing {} {}", K::NAME, id);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(items)
            })
            .await?;
        Ok(items.as_slice())
    }
}

impl<K: EntityKind> fmt::Debug for IdBatch<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdBatch")
            .field("kind", &K::NAME)
            .field("ids", &self.ids)
            .field("resolved", &self.resolved.initialized())
            .finish()
    }
}
