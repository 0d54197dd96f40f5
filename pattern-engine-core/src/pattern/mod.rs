//! Pattern data model, durable store, and in-memory cache (C1, C2).

pub mod cache;
pub mod store;
pub mod types;

pub use cache::PatternCache;
pub use store::{PatternStore, TombstoneEntry};
pub use types::{
    Applies, Health, InferredTag, Learning, Lifecycle, LifecycleStatus, Pattern, Relations,
    Security, Tags, CURRENT_SCHEMA_VERSION, MAX_CONTENT_BYTES,
};
