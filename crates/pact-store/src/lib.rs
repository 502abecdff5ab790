//! # pact-store
//!
//! Document store adapter for Pact.
//!
//! Goals and notifications live in a generic key-addressed document store.
//! Everything above this crate is expressed purely in the primitives the
//! [`DocumentStore`] trait offers: point reads, filtered queries, create,
//! partial merge, a compare-and-set update, deletes, and a change feed.
//!
//! ## Key components
//!
//! - [`DocumentStore`] — the async storage trait
//! - [`Filter`] / [`OrderBy`] — equality predicates over (dotted) field paths
//! - [`subscribe`] — full-snapshot feed built on the change broadcast
//! - [`MemoryStore`] — in-process backend (tests, embedders)
//! - [`JsonFileStore`] — one JSON file per document on disk

pub mod document;
pub mod error;
pub mod json_file;
pub mod memory;
pub mod store;

pub use document::{
    field, from_document, to_document, ChangeKind, Document, DocumentChange, Filter, OrderBy,
};
pub use error::StoreError;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::{subscribe, DocumentStore};
