//! The capabilities the façade needs from a document-database client.
//!
//! [`Driver`] and [`CollectionHandle`] are the seam between [`GoMongo`](crate::GoMongo)
//! and the client it wraps. The official [`mongodb::Client`] implements them, and so
//! does the in-memory driver used in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{
    AggregateOptions, CountOptions, DeleteOptions, FindOptions, InsertManyOptions, UpdateModifications,
    UpdateOptions,
};
use mongodb::results::{DeleteResult, InsertManyResult, UpdateResult};
use mongodb::{Client, Collection, Database};

use crate::error::{GoMongoError, GoMongoResult};

/// A lazy, single-pass sequence of documents.
pub type DocumentStream = BoxStream<'static, GoMongoResult<Document>>;

/// A document-database client.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Database handle. Resolving one is a local operation.
    type Database: Send + Sync;

    /// Collection handle. Resolving one is a local operation.
    type Collection: CollectionHandle;

    /// Establish the network session.
    async fn connect(&self) -> GoMongoResult<()>;

    /// Terminate the network session.
    async fn close(&self) -> GoMongoResult<()>;

    /// Resolve a database by name.
    fn database(&self, name: &str) -> Self::Database;

    /// Resolve a collection inside a database.
    fn collection(&self, database: &Self::Database, name: &str) -> Self::Collection;
}

/// Operations on a single collection.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    /// Count documents matching `filter`.
    async fn count_documents(
        &self,
        filter: Document,
        options: Option<CountOptions>,
    ) -> GoMongoResult<u64>;

    /// Open a cursor over documents matching `filter`.
    async fn find(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> GoMongoResult<DocumentStream>;

    /// Insert `items` in order.
    async fn insert_many(
        &self,
        items: Vec<Document>,
        options: Option<InsertManyOptions>,
    ) -> GoMongoResult<InsertOutcome>;

    /// Apply `update` to every document matching `filter`.
    async fn update_many(
        &self,
        filter: Document,
        update: UpdateModifications,
        options: Option<UpdateOptions>,
    ) -> GoMongoResult<UpdateOutcome>;

    /// Delete every document matching `filter`.
    async fn delete_many(
        &self,
        filter: Document,
        options: Option<DeleteOptions>,
    ) -> GoMongoResult<DeleteOutcome>;

    /// Run an aggregation pipeline, stages in order.
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> GoMongoResult<DocumentStream>;
}

/// Summary of an insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    /// Identity of each inserted document, keyed by its position in the input.
    pub inserted_ids: BTreeMap<usize, Bson>,
}

impl InsertOutcome {
    /// Number of inserted documents.
    pub fn inserted_count(&self) -> usize {
        self.inserted_ids.len()
    }
}

impl From<InsertManyResult> for InsertOutcome {
    fn from(result: InsertManyResult) -> Self {
        Self {
            inserted_ids: result.inserted_ids.into_iter().collect(),
        }
    }
}

/// Summary of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
    /// Identity of the upserted document, if any.
    pub upserted_id: Option<Bson>,
}

impl From<UpdateResult> for UpdateOutcome {
    fn from(result: UpdateResult) -> Self {
        Self {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        }
    }
}

/// Summary of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Documents removed.
    pub deleted_count: u64,
}

impl From<DeleteResult> for DeleteOutcome {
    fn from(result: DeleteResult) -> Self {
        Self {
            deleted_count: result.deleted_count,
        }
    }
}

#[async_trait]
impl Driver for Client {
    type Database = Database;
    type Collection = Collection<Document>;

    async fn connect(&self) -> GoMongoResult<()> {
        // The driver connects lazily; a ping forces the handshake.
        Client::database(self, "admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn close(&self) -> GoMongoResult<()> {
        // Waits until every cursor and session created from this client is dropped.
        self.clone().shutdown().await;
        Ok(())
    }

    fn database(&self, name: &str) -> Database {
        Client::database(self, name)
    }

    fn collection(&self, database: &Database, name: &str) -> Collection<Document> {
        database.collection(name)
    }
}

#[async_trait]
impl CollectionHandle for Collection<Document> {
    async fn count_documents(
        &self,
        filter: Document,
        options: Option<CountOptions>,
    ) -> GoMongoResult<u64> {
        Ok(Collection::<Document>::count_documents(self, filter, options).await?)
    }

    async fn find(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> GoMongoResult<DocumentStream> {
        let cursor = Collection::<Document>::find(self, filter, options).await?;
        Ok(cursor.map_err(GoMongoError::from).boxed())
    }

    async fn insert_many(
        &self,
        items: Vec<Document>,
        options: Option<InsertManyOptions>,
    ) -> GoMongoResult<InsertOutcome> {
        let result = Collection::<Document>::insert_many(self, items, options).await?;
        Ok(result.into())
    }

    async fn update_many(
        &self,
        filter: Document,
        update: UpdateModifications,
        options: Option<UpdateOptions>,
    ) -> GoMongoResult<UpdateOutcome> {
        let result = Collection::<Document>::update_many(self, filter, update, options).await?;
        Ok(result.into())
    }

    async fn delete_many(
        &self,
        filter: Document,
        options: Option<DeleteOptions>,
    ) -> GoMongoResult<DeleteOutcome> {
        let result = Collection::<Document>::delete_many(self, filter, options).await?;
        Ok(result.into())
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> GoMongoResult<DocumentStream> {
        let cursor = Collection::<Document>::aggregate(self, pipeline, options).await?;
        Ok(cursor.map_err(GoMongoError::from).boxed())
    }
}
