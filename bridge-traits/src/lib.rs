//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the cache core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP fetches with retry and TLS
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Blob file I/O for cached images and thumbnails
//!
//! ### Storage
//! - [`KeyValueStore`](kv::KeyValueStore) - Namespaced persistent store for payloads and metadata
//! - [`SettingsStore`](storage::SettingsStore) - Typed key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic TTL testing
//!
//! ## Platform Requirements
//!
//! Each supported platform must ship concrete adapters for every required bridge trait:
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! In-memory implementations ([`MemoryKeyValueStore`](kv::MemoryKeyValueStore),
//! [`MemorySettingsStore`](storage::MemorySettingsStore),
//! [`ManualClock`](time::ManualClock)) are provided here for tests and
//! development hosts.
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for consistent
//! error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., file paths, HTTP status)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks. Implementations must ensure thread safety.

pub mod error;
pub mod http;
pub mod kv;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use storage::{FileMetadata, FileSystemAccess, MemorySettingsStore, SettingsStore};
pub use time::{Clock, ManualClock, SystemClock};
