//! The connection façade.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bson::Document;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::options::{
    AggregateOptions, ClientOptions, CountOptions, DeleteOptions, FindOptions, InsertManyOptions,
    UpdateModifications, UpdateOptions,
};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{GoMongoConfig, GoMongoConfigBuilder};
use crate::driver::{
    CollectionHandle, DeleteOutcome, DocumentStream, Driver, InsertOutcome, UpdateOutcome,
};
use crate::error::{GoMongoError, GoMongoResult};

/// Where an instance is in its lifetime.
///
/// `Fresh` moves to `Connected` on the first successful handshake. Either moves
/// to `Destroyed` on [`GoMongo::destroy`], and nothing leaves `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, no handshake completed yet.
    Fresh,
    /// Handshake completed.
    Connected,
    /// Closed for good.
    Destroyed,
}

/// A simplified interface for interacting with MongoDB.
///
/// Each instance exclusively owns one client. The first operation performs the
/// handshake; concurrent first operations share that single handshake. Database
/// and collection handles are resolved by name on every call.
///
/// Once [`destroy`](Self::destroy) is called, every method fails with
/// [`GoMongoError::Destroyed`]. Create a new instance to reconnect.
///
/// Driver failures are returned unmodified; there is no retry.
///
/// # Example
///
/// ```rust,ignore
/// use gomongo_client::{GoMongo, doc};
///
/// let db = GoMongo::new("mongodb://localhost:27017").await?;
///
/// db.add("shop", "widgets", vec![doc! { "name": "a" }], None).await?;
/// let widgets = db.find_all("shop", "widgets", doc! { "name": "a" }, None).await?;
///
/// db.destroy().await?;
/// ```
pub struct GoMongo<D: Driver = Client> {
    driver: D,
    connection: OnceCell<()>,
    destroyed: AtomicBool,
}

impl GoMongo<Client> {
    /// Create an instance from a connection URI, e.g.
    /// `mongodb://{username}:{password}@{hostname}:{port}/`.
    ///
    /// The URI is parsed here (which may resolve SRV records) but no connection
    /// is made until the first operation.
    pub async fn new(connection_url: &str) -> GoMongoResult<Self> {
        let options = ClientOptions::parse(connection_url).await?;
        Self::with_options(options)
    }

    /// Create an instance from driver options. The options are handed to the
    /// driver as they are.
    pub fn with_options(client_options: ClientOptions) -> GoMongoResult<Self> {
        let hosts = client_options
            .hosts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let client = Client::with_options(client_options)?;

        info!(hosts = %hosts, "GoMongo client created");

        Ok(Self::with_driver(client))
    }

    /// Create an instance from a [`GoMongoConfig`].
    pub async fn from_config(config: &GoMongoConfig) -> GoMongoResult<Self> {
        Self::with_options(config.to_client_options().await?)
    }

    /// Create a builder for an instance.
    pub fn builder() -> GoMongoBuilder {
        GoMongoBuilder::new()
    }
}

impl<D: Driver> GoMongo<D> {
    /// Wrap an arbitrary driver.
    pub fn with_driver(driver: D) -> Self {
        Self {
            driver,
            connection: OnceCell::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The underlying client. Using it directly bypasses the lifecycle guards.
    pub fn inner(&self) -> &D {
        &self.driver
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        if self.destroyed.load(Ordering::SeqCst) {
            Lifecycle::Destroyed
        } else if self.connection.initialized() {
            Lifecycle::Connected
        } else {
            Lifecycle::Fresh
        }
    }

    /// Whether a handshake completed and the instance is still usable.
    pub fn is_connected(&self) -> bool {
        self.state() == Lifecycle::Connected
    }

    /// Whether [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.state() == Lifecycle::Destroyed
    }

    /// Fail with [`GoMongoError::Destroyed`] if the instance was destroyed.
    pub fn ensure_not_destroyed(&self) -> GoMongoResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(GoMongoError::Destroyed);
        }
        Ok(())
    }

    /// Connect if no handshake has completed yet.
    ///
    /// Every operation calls this first. Concurrent callers wait on a single
    /// handshake. A failed handshake is not remembered, so the next call tries again.
    pub async fn ensure_connection(&self) -> GoMongoResult<&Self> {
        self.ensure_not_destroyed()?;

        let connected = self
            .connection
            .get_or_try_init(|| async {
                debug!("Connecting");
                self.driver.connect().await?;
                info!("GoMongo connection established");
                Ok::<(), GoMongoError>(())
            })
            .await;

        // destroy() may have run while the handshake was in flight, and wins
        // over both outcomes.
        self.ensure_not_destroyed()?;
        connected?;
        Ok(self)
    }

    /// Close the connection with no way to reconnect.
    ///
    /// After this, every method fails with [`GoMongoError::Destroyed`]. Calling it
    /// again is a no-op. With the official driver this waits until all cursors
    /// returned by [`find`](Self::find) and [`aggregate`](Self::aggregate) are dropped.
    pub async fn destroy(&self) -> GoMongoResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("GoMongo instance already destroyed");
            return Ok(());
        }

        self.driver.close().await?;
        info!("GoMongo instance destroyed");
        Ok(())
    }

    /// Resolve a database by name. No network round-trip is made.
    pub fn database(&self, database_name: &str) -> GoMongoResult<D::Database> {
        self.ensure_not_destroyed()?;
        Ok(self.driver.database(database_name))
    }

    /// Resolve a collection by database and collection name.
    pub fn collection(
        &self,
        database_name: &str,
        collection_name: &str,
    ) -> GoMongoResult<D::Collection> {
        let database = self.database(database_name)?;
        Ok(self.driver.collection(&database, collection_name))
    }

    async fn connected_collection(
        &self,
        database_name: &str,
        collection_name: &str,
    ) -> GoMongoResult<D::Collection> {
        self.ensure_connection().await?;
        self.collection(database_name, collection_name)
    }

    /// Count the documents matching `filter`. An empty filter counts all documents.
    pub async fn count(
        &self,
        database_name: &str,
        collection_name: &str,
        filter: Document,
        options: impl Into<Option<CountOptions>>,
    ) -> GoMongoResult<u64> {
        let options = options.into();
        let collection = self
            .connected_collection(database_name, collection_name)
            .await?;

        debug!(database = %database_name, collection = %collection_name, "Counting documents");
        collection.count_documents(filter, options).await
    }

    /// Open a lazy cursor over the documents matching `filter`.
    ///
    /// An empty filter matches all documents. Nothing is buffered beyond the
    /// driver's batch; use [`find_all`](Self::find_all) to collect everything.
    pub async fn find(
        &self,
        database_name: &str,
        collection_name: &str,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> GoMongoResult<DocumentStream> {
        let options = options.into();
        let collection = self
            .connected_collection(database_name, collection_name)
            .await?;

        debug!(database = %database_name, collection = %collection_name, "Finding documents");
        collection.find(filter, options).await
    }

    /// Collect every document matching `filter`, in cursor order.
    pub async fn find_all(
        &self,
        database_name: &str,
        collection_name: &str,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> GoMongoResult<Vec<Document>> {
        self.find(database_name, collection_name, filter, options)
            .await?
            .try_collect()
            .await
    }

    /// Collect every document matching `filter` and deserialize each into `T`.
    pub async fn find_as<T: DeserializeOwned>(
        &self,
        database_name: &str,
        collection_name: &str,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> GoMongoResult<Vec<T>> {
        let documents = self
            .find_all(database_name, collection_name, filter, options)
            .await?;

        documents
            .into_iter()
            .map(|document| bson::from_document(document).map_err(GoMongoError::from))
            .collect()
    }

    /// Insert `items` in order.
    ///
    /// Documents without an `_id` get one generated by the driver. An empty
    /// `items` inserts nothing and returns an empty outcome.
    pub async fn add(
        &self,
        database_name: &str,
        collection_name: &str,
        items: impl IntoIterator<Item = Document>,
        options: impl Into<Option<InsertManyOptions>>,
    ) -> GoMongoResult<InsertOutcome> {
        let items: Vec<Document> = items.into_iter().collect();
        let options = options.into();
        let collection = self
            .connected_collection(database_name, collection_name)
            .await?;

        if items.is_empty() {
            return Ok(InsertOutcome::default());
        }

        debug!(
            database = %database_name,
            collection = %collection_name,
            count = items.len(),
            "Adding documents"
        );
        collection.insert_many(items, options).await
    }

    /// Apply `update` to every document matching `filter`. An empty filter
    /// updates all documents.
    pub async fn update(
        &self,
        database_name: &str,
        collection_name: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> GoMongoResult<UpdateOutcome> {
        let update = update.into();
        let options = options.into();
        let collection = self
            .connected_collection(database_name, collection_name)
            .await?;

        debug!(database = %database_name, collection = %collection_name, "Updating documents");
        collection.update_many(filter, update, options).await
    }

    /// Remove every document matching `filter`.
    ///
    /// An empty filter removes all documents in the collection.
    pub async fn remove(
        &self,
        database_name: &str,
        collection_name: &str,
        filter: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> GoMongoResult<DeleteOutcome> {
        let options = options.into();
        let collection = self
            .connected_collection(database_name, collection_name)
            .await?;

        debug!(database = %database_name, collection = %collection_name, "Removing documents");
        collection.delete_many(filter, options).await
    }

    /// Run an aggregation pipeline and return a lazy cursor over its output.
    ///
    /// Stages run in order, each consuming the previous stage's output.
    pub async fn aggregate(
        &self,
        database_name: &str,
        collection_name: &str,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> GoMongoResult<DocumentStream> {
        let pipeline: Vec<Document> = pipeline.into_iter().collect();
        let options = options.into();
        let collection = self
            .connected_collection(database_name, collection_name)
            .await?;

        debug!(
            database = %database_name,
            collection = %collection_name,
            stages = pipeline.len(),
            "Aggregating"
        );
        collection.aggregate(pipeline, options).await
    }

    /// Run an aggregation pipeline and collect its output.
    pub async fn aggregate_all(
        &self,
        database_name: &str,
        collection_name: &str,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> GoMongoResult<Vec<Document>> {
        self.aggregate(database_name, collection_name, pipeline, options)
            .await?
            .try_collect()
            .await
    }
}

impl<D: Driver> fmt::Debug for GoMongo<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoMongo")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`GoMongo`] backed by the official driver.
#[derive(Debug, Default)]
pub struct GoMongoBuilder {
    config: GoMongoConfigBuilder,
}

impl GoMongoBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config = self.config.uri(uri);
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.app_name(name);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.config = self.config.max_pool_size(size);
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.config = self.config.min_pool_size(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config = self.config.connect_timeout(duration);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.config = self.config.direct_connection(enabled);
        self
    }

    /// Build the instance. No connection is made yet.
    pub async fn build(self) -> GoMongoResult<GoMongo> {
        let config = self.config.build()?;
        GoMongo::from_config(&config).await
    }
}
