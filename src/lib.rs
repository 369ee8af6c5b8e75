//! # GoMongo
//!
//! A convenience façade over MongoDB: connect once, then count, find, add,
//! update, remove and aggregate documents by database and collection name.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gomongo::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GoMongoError> {
//!     let db = GoMongo::new("mongodb://localhost:27017").await?;
//!
//!     let outcome = db
//!         .add("shop", "widgets", vec![doc! { "name": "a" }], None)
//!         .await?;
//!     println!("inserted {}", outcome.inserted_count());
//!
//!     let widgets = db.find_all("shop", "widgets", doc! { "name": "a" }, None).await?;
//!     assert_eq!(widgets.len(), 1);
//!
//!     db.destroy().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use gomongo_client::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use gomongo_client::prelude::*;
}
