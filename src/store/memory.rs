//! In-process document engine.
//!
//! Implements the subset of engine behavior the gateway relies on:
//! - top-level equality filters (operator filters are rejected)
//! - `$set`, `$unset` and `$inc` update modifiers
//! - generated `ObjectId` identifiers and duplicate `_id` rejection
//! - implicit collection creation on insert
//!
//! All sessions opened from one [`MemoryConnector`] share the same data,
//! the way clients of one server do. The probe behavior can be switched to
//! simulate refused or unreachable targets.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};

use crate::broker::ConnectionTarget;
use crate::store::{Connector, Namespace, Session, StoreError, StoreResult, UpdateCounts};

/// How sessions answer the liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Probe {
    #[default]
    Healthy,
    /// The probe fails immediately.
    Refused,
    /// The probe never completes.
    Hang,
}

type Databases = HashMap<String, BTreeMap<String, Vec<Document>>>;

#[derive(Default)]
struct Engine {
    databases: Mutex<Databases>,
    probe: Mutex<Probe>,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl Engine {
    fn data(&self) -> MutexGuard<'_, Databases> {
        self.databases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connector for the in-process engine. Cloning shares the engine.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    engine: Arc<Engine>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_probe(&self, probe: Probe) {
        *self.engine.probe.lock().unwrap_or_else(PoisonError::into_inner) = probe;
    }

    /// Sessions opened so far.
    pub fn opened_sessions(&self) -> u64 {
        self.engine.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn closed_sessions(&self) -> u64 {
        self.engine.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection's documents, or `None` if it does not exist.
    pub fn documents(&self, ns: &Namespace) -> Option<Vec<Document>> {
        self.engine
            .data()
            .get(&ns.database)
            .and_then(|collections| collections.get(&ns.collection))
            .cloned()
    }

    /// Number of collections in `database`.
    pub fn collection_count(&self, database: &str) -> usize {
        self.engine.data().get(database).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, target: &ConnectionTarget) -> StoreResult<Box<dyn Session>> {
        self.engine.opened.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(uri = %target, "Memory session opened");
        Ok(Box::new(MemorySession {
            engine: Arc::clone(&self.engine),
        }))
    }
}

struct MemorySession {
    engine: Arc<Engine>,
}

#[async_trait]
impl Session for MemorySession {
    async fn ping(&self) -> StoreResult<()> {
        let probe = *self.engine.probe.lock().unwrap_or_else(PoisonError::into_inner);
        match probe {
            Probe::Healthy => Ok(()),
            Probe::Refused => Err(StoreError::new("connection refused")),
            Probe::Hang => std::future::pending().await,
        }
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .engine
            .data()
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(&self, ns: &Namespace) -> StoreResult<()> {
        let mut data = self.engine.data();
        let collections = data.entry(ns.database.clone()).or_default();
        if collections.contains_key(&ns.collection) {
            return Err(StoreError::new(format!(
                "Collection already exists. NS: {ns}"
            )));
        }
        collections.insert(ns.collection.clone(), Vec::new());
        Ok(())
    }

    async fn find(&self, ns: &Namespace, filter: Document) -> StoreResult<Vec<Document>> {
        check_filter(&filter)?;
        let data = self.engine.data();
        let Some(records) = data.get(&ns.database).and_then(|c| c.get(&ns.collection)) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|record| matches(record, &filter))
            .cloned()
            .collect())
    }

    async fn insert_one(&self, ns: &Namespace, record: Document) -> StoreResult<Bson> {
        let mut data = self.engine.data();
        let records = collection_mut(&mut data, ns);
        insert(records, record)
    }

    async fn insert_many(&self, ns: &Namespace, records: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let mut data = self.engine.data();
        let stored = collection_mut(&mut data, ns);

        // Ordered insert: stop at the first failure, keep what went in before it.
        records
            .into_iter()
            .map(|record| insert(stored, record))
            .collect()
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateCounts> {
        check_filter(&filter)?;
        let modifiers = parse_update(&update)?;

        let mut data = self.engine.data();
        let Some(records) = data
            .get_mut(&ns.database)
            .and_then(|c| c.get_mut(&ns.collection))
        else {
            return Ok(UpdateCounts::default());
        };

        let mut counts = UpdateCounts::default();
        for record in records.iter_mut().filter(|r| matches(r, &filter)) {
            counts.matched += 1;
            let before = record.clone();
            for modifier in &modifiers {
                modifier.apply(record)?;
            }
            if *record != before {
                counts.modified += 1;
            }
        }
        Ok(counts)
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> StoreResult<u64> {
        check_filter(&filter)?;
        let mut data = self.engine.data();
        let Some(records) = data
            .get_mut(&ns.database)
            .and_then(|c| c.get_mut(&ns.collection))
        else {
            return Ok(0);
        };

        let before = records.len();
        records.retain(|record| !matches(record, &filter));
        Ok((before - records.len()) as u64)
    }

    async fn close(self: Box<Self>) {
        self.engine.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn collection_mut<'a>(data: &'a mut Databases, ns: &Namespace) -> &'a mut Vec<Document> {
    data.entry(ns.database.clone())
        .or_default()
        .entry(ns.collection.clone())
        .or_default()
}

fn insert(records: &mut Vec<Document>, record: Document) -> StoreResult<Bson> {
    let id = record
        .get("_id")
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    if records.iter().any(|existing| existing.get("_id") == Some(&id)) {
        return Err(StoreError::new(format!(
            "E11000 duplicate key error dup key: {{ _id: {id} }}"
        )));
    }

    let mut stored = Document::new();
    stored.insert("_id", id.clone());
    for (key, value) in record {
        if key != "_id" {
            stored.insert(key, value);
        }
    }
    records.push(stored);
    Ok(id)
}

fn check_filter(filter: &Document) -> StoreResult<()> {
    match filter.keys().find(|key| key.starts_with('$')) {
        Some(op) => Err(StoreError::new(format!("unknown top level operator: {op}"))),
        None => Ok(()),
    }
}

fn matches(record: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

enum Modifier<'a> {
    Set(&'a Document),
    Unset(&'a Document),
    Inc(&'a Document),
}

fn parse_update(update: &Document) -> StoreResult<Vec<Modifier<'_>>> {
    if update.is_empty() {
        return Err(StoreError::new("Update document must not be empty"));
    }

    update
        .iter()
        .map(|(op, args)| {
            let Bson::Document(fields) = args else {
                return Err(StoreError::new(format!(
                    "Modifiers operate on fields but we found type {:?} instead",
                    args.element_type()
                )));
            };
            match op.as_str() {
                "$set" => Ok(Modifier::Set(fields)),
                "$unset" => Ok(Modifier::Unset(fields)),
                "$inc" => Ok(Modifier::Inc(fields)),
                other if other.starts_with('$') => {
                    Err(StoreError::new(format!("Unknown modifier: {other}")))
                }
                _ => Err(StoreError::new("update document requires atomic operators")),
            }
        })
        .collect()
}

impl Modifier<'_> {
    fn apply(&self, record: &mut Document) -> StoreResult<()> {
        match self {
            Modifier::Set(fields) => {
                for (key, value) in fields.iter() {
                    record.insert(key.clone(), value.clone());
                }
            }
            Modifier::Unset(fields) => {
                for key in fields.keys() {
                    record.remove(key);
                }
            }
            Modifier::Inc(fields) => {
                for (key, delta) in fields.iter() {
                    let next = increment(record.get(key), delta)?;
                    record.insert(key.clone(), next);
                }
            }
        }
        Ok(())
    }
}

fn increment(current: Option<&Bson>, delta: &Bson) -> StoreResult<Bson> {
    let sum = match (current, delta) {
        (None, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => delta.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => Bson::Int32(a.wrapping_add(*b)),
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a + b),
        (Some(Bson::Double(a)), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Some(Bson::Double(a)), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(Bson::Int32(a)), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Some(Bson::Int64(a)), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => {
            return Err(StoreError::new(
                "Cannot apply $inc to a value of non-numeric type",
            ))
        }
    };
    Ok(sum)
}
