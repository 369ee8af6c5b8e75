//! An in-memory [`Driver`] for exercising the façade without a server.
//!
//! Collections live in process memory and are shared between clones of the same
//! [`MemoryDriver`]. The driver records how often it was asked to connect and close,
//! and can be told to delay or fail the handshake.
//!
//! ```rust,ignore
//! use gomongo_client::{GoMongo, doc};
//! use gomongo_client::memory::MemoryDriver;
//!
//! let driver = MemoryDriver::new();
//! let db = GoMongo::with_driver(driver.clone());
//!
//! db.add("shop", "widgets", vec![doc! { "name": "a" }], None).await?;
//! assert_eq!(driver.connect_count(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use futures::StreamExt;
use futures::stream;
use mongodb::options::{
    AggregateOptions, CountOptions, DeleteOptions, FindOptions, InsertManyOptions, UpdateModifications,
    UpdateOptions,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::driver::{
    CollectionHandle, DeleteOutcome, DocumentStream, Driver, InsertOutcome, UpdateOutcome,
};
use crate::error::{GoMongoError, GoMongoResult};
use crate::filter;

type Namespace = (String, String);

#[derive(Default)]
struct Shared {
    collections: Mutex<HashMap<Namespace, Vec<Document>>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    failing_connects: AtomicUsize,
    connect_delay: Option<Duration>,
}

/// In-memory document store implementing [`Driver`].
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose handshake takes `delay`.
    pub fn with_connect_delay(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                connect_delay: Some(delay),
                ..Shared::default()
            }),
        }
    }

    /// Make the next `count` handshakes fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.shared.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Number of handshakes attempted, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of times the session was closed.
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection's documents in insertion order.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.shared
            .collections
            .lock()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Database = MemoryDatabase;
    type Collection = MemoryCollection;

    async fn connect(&self) -> GoMongoResult<()> {
        if let Some(delay) = self.shared.connect_delay {
            tokio::time::sleep(delay).await;
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        let failing = self.shared.failing_connects.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        if failing.is_ok() {
            let refused = std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "in-memory handshake refused",
            );
            return Err(mongodb::error::Error::from(refused).into());
        }

        Ok(())
    }

    async fn close(&self) -> GoMongoResult<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn database(&self, name: &str) -> MemoryDatabase {
        MemoryDatabase {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
        }
    }

    fn collection(&self, database: &MemoryDatabase, name: &str) -> MemoryCollection {
        database.collection(name)
    }
}

/// Database handle of a [`MemoryDriver`].
#[derive(Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
    name: String,
}

impl MemoryDatabase {
    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a collection in this database.
    pub fn collection(&self, name: &str) -> MemoryCollection {
        MemoryCollection {
            shared: Arc::clone(&self.shared),
            namespace: (self.name.clone(), name.to_string()),
        }
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Collection handle of a [`MemoryDriver`].
#[derive(Clone)]
pub struct MemoryCollection {
    shared: Arc<Shared>,
    namespace: Namespace,
}

impl MemoryCollection {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.namespace.1
    }

    fn matching(&self, filter: &Document) -> GoMongoResult<Vec<Document>> {
        let collections = self.shared.collections.lock();
        let Some(documents) = collections.get(&self.namespace) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for document in documents {
            if filter::matches(document, filter)? {
                matched.push(document.clone());
            }
        }
        Ok(matched)
    }
}

impl fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("database", &self.namespace.0)
            .field("name", &self.namespace.1)
            .finish_non_exhaustive()
    }
}

fn window(mut documents: Vec<Document>, skip: Option<u64>, limit: Option<i64>) -> Vec<Document> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    documents.drain(..skip.min(documents.len()));
    // A negative limit means a single batch of |limit| documents.
    if let Some(limit) = limit.filter(|l| *l != 0) {
        documents.truncate(usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX));
    }
    documents
}

fn as_count(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn to_stream(documents: Vec<Document>) -> DocumentStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    async fn count_documents(
        &self,
        filter: Document,
        options: Option<CountOptions>,
    ) -> GoMongoResult<u64> {
        let options = options.unwrap_or_default();
        let matched = self.matching(&filter)?;
        let limit = options.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        Ok(window(matched, options.skip, limit).len() as u64)
    }

    async fn find(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> GoMongoResult<DocumentStream> {
        let options = options.unwrap_or_default();
        let mut matched = self.matching(&filter)?;
        if let Some(ref order) = options.sort {
            filter::sort(&mut matched, order)?;
        }
        Ok(to_stream(window(matched, options.skip, options.limit)))
    }

    async fn insert_many(
        &self,
        items: Vec<Document>,
        _options: Option<InsertManyOptions>,
    ) -> GoMongoResult<InsertOutcome> {
        let mut collections = self.shared.collections.lock();
        let documents = collections.entry(self.namespace.clone()).or_default();
        let mut outcome = InsertOutcome::default();

        for (index, item) in items.into_iter().enumerate() {
            let document = if item.contains_key("_id") {
                item
            } else {
                let mut document = doc! { "_id": ObjectId::new() };
                document.extend(item);
                document
            };

            let id = document.get("_id").cloned().unwrap_or(Bson::Null);
            if documents.iter().any(|existing| existing.get("_id") == Some(&id)) {
                return Err(GoMongoError::query(format!(
                    "E11000 duplicate key error collection: {}.{} dup key: {{ _id: {id} }}",
                    self.namespace.0, self.namespace.1
                )));
            }

            documents.push(document);
            outcome.inserted_ids.insert(index, id);
        }

        debug!(
            collection = %self.namespace.1,
            inserted = outcome.inserted_count(),
            "In-memory insert"
        );
        Ok(outcome)
    }

    async fn update_many(
        &self,
        filter: Document,
        update: UpdateModifications,
        _options: Option<UpdateOptions>,
    ) -> GoMongoResult<UpdateOutcome> {
        let UpdateModifications::Document(update) = update else {
            return Err(GoMongoError::query(
                "pipeline updates are not supported in memory",
            ));
        };

        let mut collections = self.shared.collections.lock();
        let Some(documents) = collections.get_mut(&self.namespace) else {
            return Ok(UpdateOutcome::default());
        };

        // Validate against copies first so a rejected update leaves nothing half-applied.
        let mut updated = documents.clone();
        let mut outcome = UpdateOutcome::default();
        for document in updated.iter_mut() {
            if filter::matches(document, &filter)? {
                outcome.matched_count += 1;
                if filter::apply_update(document, &update)? {
                    outcome.modified_count += 1;
                }
            }
        }

        *documents = updated;
        Ok(outcome)
    }

    async fn delete_many(
        &self,
        filter: Document,
        _options: Option<DeleteOptions>,
    ) -> GoMongoResult<DeleteOutcome> {
        let mut collections = self.shared.collections.lock();
        let Some(documents) = collections.get_mut(&self.namespace) else {
            return Ok(DeleteOutcome::default());
        };

        let mut kept = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            if !filter::matches(document, &filter)? {
                kept.push(document.clone());
            }
        }

        let deleted_count = (documents.len() - kept.len()) as u64;
        *documents = kept;
        Ok(DeleteOutcome { deleted_count })
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        _options: Option<AggregateOptions>,
    ) -> GoMongoResult<DocumentStream> {
        let mut documents = self.matching(&doc! {})?;

        for stage in &pipeline {
            let mut entries = stage.iter();
            let (Some((name, argument)), None) = (entries.next(), entries.next()) else {
                return Err(GoMongoError::query(
                    "a pipeline stage must have exactly one field",
                ));
            };

            documents = match (name.as_str(), argument) {
                ("$match", Bson::Document(filter)) => {
                    let mut kept = Vec::with_capacity(documents.len());
                    for document in documents {
                        if filter::matches(&document, filter)? {
                            kept.push(document);
                        }
                    }
                    kept
                }
                ("$sort", Bson::Document(order)) => {
                    filter::sort(&mut documents, order)?;
                    documents
                }
                ("$skip", n) => match as_count(n) {
                    Some(n) if n >= 0 => window(documents, u64::try_from(n).ok(), None),
                    _ => return Err(GoMongoError::query("$skip needs a non-negative integer")),
                },
                ("$limit", n) => match as_count(n) {
                    Some(n) if n > 0 => window(documents, None, Some(n)),
                    _ => return Err(GoMongoError::query("$limit needs a positive integer")),
                },
                ("$count", Bson::String(field)) => {
                    if documents.is_empty() {
                        Vec::new()
                    } else {
                        let mut counted = Document::new();
                        let total = i64::try_from(documents.len()).unwrap_or(i64::MAX);
                        let total = i32::try_from(total).map_or(Bson::Int64(total), Bson::Int32);
                        counted.insert(field.clone(), total);
                        vec![counted]
                    }
                }
                (other, _) => {
                    return Err(GoMongoError::query(format!(
                        "unsupported pipeline stage {other}"
                    )));
                }
            };
        }

        Ok(to_stream(documents))
    }
}
