//! Kane — a schemaless document layer over an ordered key/value store.
//!
//! Documents are plain serializable structs. Storing one writes its record
//! and a secondary-index entry for every scalar field (nested fields, array
//! elements included), all into a single lexicographically ordered keyspace,
//! kept consistent using nothing but the engine's single-key
//! compare-and-swap. Lookups are equality or existence predicates over one
//! field.
//!
//! # Example
//!
//! ```ignore
//! use kane::{CancellationToken, Db, Document, Filter};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Document)]
//! struct User {
//!     id: String,
//!     name: String,
//!     age: u32,
//! }
//!
//! let cancel = CancellationToken::new();
//! let db = Db::connect(&cancel, "tikv://127.0.0.1:2379").await?;
//!
//! db.put(&cancel, &User { id: "bob".into(), name: "Bob".into(), age: 42 }).await?;
//!
//! let user: User = db.get(&cancel, &Filter::eq("age", 42u32)).await?;
//! assert_eq!(user.name, "Bob");
//!
//! let mut users = db.iter::<User>(&cancel, &Filter::has("name")).await;
//! while let Some(user) = users.next().await? {
//!     println!("{}", user.name);
//! }
//! ```

mod db;
mod document;
mod error;
mod find;
mod index;
mod iter;
mod keys;
mod read;
mod serde;
mod value;
mod walk;
mod write;

pub use db::Db;
pub use document::{Document, History, Stored};
pub use error::{Error, Result};
pub use find::Filter;
pub use iter::DocIter;
pub use value::IndexValue;

/// Engine selection, re-exported from the `kv` crate for callers of
/// [`Db::open`].
pub use kv::EngineConfig;

/// Derives [`Document`] for a struct, taking the primary key from the field
/// marked `#[document(pk)]` or, by default, the field named `id`.
pub use kane_macros::Document;

/// Cancellation handle accepted by every operation.
pub use tokio_util::sync::CancellationToken;
