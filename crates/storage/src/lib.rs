//! Persistence for done tables.
//!
//! Each stage owns one done table; the store rewrites the full table on
//! every checkpoint. At the expected scale (hundreds to low thousands of
//! rows) rewrite-on-write is cheaper than being clever.

mod json_store;
mod trait_;

pub use json_store::JsonMetadataStore;
pub use trait_::{MetadataStore, Result, StorageError};
