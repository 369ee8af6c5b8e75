//! # gomongo-client
//!
//! A convenience façade over the official MongoDB driver.
//!
//! [`GoMongo`] owns one client, connects lazily on first use and forwards a small
//! set of shorthand operations (`count`, `find`, `add`, `update`, `remove`,
//! `aggregate`) to the collection named on each call.
//!
//! This crate provides:
//! - Lazy, single-flight connection handling
//! - An explicit lifecycle: once destroyed, an instance rejects every call
//! - A [`Driver`] seam so any client (including the in-memory driver behind the
//!   `memory` feature) can be wrapped
//! - Configuration from code, environment, or TOML
//!
//! ## Example
//!
//! ```rust,ignore
//! use gomongo_client::{GoMongo, doc};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = GoMongo::new("mongodb://localhost:27017").await?;
//!
//!     db.add("shop", "widgets", vec![doc! { "name": "a" }], None).await?;
//!     let total = db.count("shop", "widgets", doc! {}, None).await?;
//!     db.update("shop", "widgets", doc! { "name": "a" }, doc! { "$set": { "qty": 3 } }, None)
//!         .await?;
//!
//!     db.destroy().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod logging;
#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::{GoMongo, GoMongoBuilder, Lifecycle};
pub use config::{GoMongoConfig, GoMongoConfigBuilder, ReadPreference, WriteConcern};
pub use driver::{
    CollectionHandle, DeleteOutcome, DocumentStream, Driver, InsertOutcome, UpdateOutcome,
};
pub use error::{GoMongoError, GoMongoResult};
pub use mongodb;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{GoMongo, GoMongoBuilder, Lifecycle};
    pub use crate::config::{GoMongoConfig, GoMongoConfigBuilder};
    pub use crate::driver::{DocumentStream, Driver, InsertOutcome, UpdateOutcome, DeleteOutcome};
    pub use crate::error::{GoMongoError, GoMongoResult};
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
