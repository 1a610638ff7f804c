//! # Event Bus System
//!
//! Provides an event-driven architecture for the Reading Platform Core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between the cache core and host UI layers through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, EventBus, PrefetchEvent};
//!
//! let event_bus = EventBus::new(100);
//! let event = CacheEvent::Prefetch(PrefetchEvent::Started {
//!     content_id: "book-42".to_string(),
//!     total_items: 12,
//! });
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```no_run
//! use core_runtime::events::EventBus;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = subscriber.recv().await {
//!         println!("Received: {:?}", event);
//!     }
//! });
//! # }
//! ```
//!
//! ## Performance Notes
//!
//! - **Slow Subscribers**: Slow subscribers receive `Lagged` errors but don't
//!   block fast ones.
//! - **Cloning**: Events are cloned for each subscriber. Keep payloads light.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all cache event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CacheEvent {
    /// Prefetch-related events
    Prefetch(PrefetchEvent),
    /// Maintenance-sweep-related events
    Maintenance(MaintenanceEvent),
    /// Individual entry lifecycle events
    Entry(EntryEvent),
}

impl CacheEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CacheEvent::Prefetch(e) => e.description(),
            CacheEvent::Maintenance(e) => e.description(),
            CacheEvent::Entry(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CacheEvent::Prefetch(PrefetchEvent::Failed { .. }) => EventSeverity::Error,
            CacheEvent::Prefetch(PrefetchEvent::Completed { .. }) => EventSeverity::Info,
            CacheEvent::Maintenance(MaintenanceEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Prefetch Events
// ============================================================================

/// Events emitted while prefetching content for offline use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PrefetchEvent {
    /// Prefetch job initiated.
    Started {
        /// Identifier of the content being prefetched (e.g. a book id).
        content_id: String,
        /// Total items to fetch.
        total_items: u64,
    },
    /// Incremental progress update; emitted after every item.
    Progress {
        /// Identifier of the content being prefetched.
        content_id: String,
        /// Items finished so far (successes and failures both count).
        completed_items: u64,
        /// Total items to fetch.
        total_items: u64,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// Prefetch finished.
    Completed {
        /// Identifier of the content that was prefetched.
        content_id: String,
        /// Items that were fetched successfully.
        succeeded: u64,
        /// Items that failed.
        failed: u64,
    },
    /// Prefetch stopped on an unrecoverable error.
    Failed {
        /// Identifier of the content being prefetched.
        content_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// Prefetch was cancelled by the caller.
    Canceled {
        /// Identifier of the content being prefetched.
        content_id: String,
        /// Items finished before cancellation.
        completed_items: u64,
    },
}

impl PrefetchEvent {
    fn description(&self) -> &str {
        match self {
            PrefetchEvent::Started { .. } => "Prefetch started",
            PrefetchEvent::Progress { .. } => "Prefetch in progress",
            PrefetchEvent::Completed { .. } => "Prefetch completed",
            PrefetchEvent::Failed { .. } => "Prefetch failed",
            PrefetchEvent::Canceled { .. } => "Prefetch canceled",
        }
    }
}

// ============================================================================
// Maintenance Events
// ============================================================================

/// Events emitted by the periodic maintenance sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MaintenanceEvent {
    /// Expired entries were removed from a namespace.
    ExpiredCleared {
        /// The namespace that was swept.
        namespace: String,
        /// Entries removed.
        removed: u64,
        /// Entries that could not be processed.
        failed: u64,
    },
    /// A namespace was brought back under its size budget.
    SizeEnforced {
        /// The namespace that was swept.
        namespace: String,
        /// Entries evicted.
        evicted: u64,
        /// Entries that could not be processed.
        failed: u64,
    },
    /// A full maintenance pass over all namespaces finished.
    Completed {
        /// Total entries removed by expiry across namespaces.
        expired_removed: u64,
        /// Total entries evicted for size across namespaces.
        evicted: u64,
        /// Duration of the pass in milliseconds.
        duration_ms: u64,
    },
}

impl MaintenanceEvent {
    fn description(&self) -> &str {
        match self {
            MaintenanceEvent::ExpiredCleared { .. } => "Expired entries cleared",
            MaintenanceEvent::SizeEnforced { .. } => "Size limit enforced",
            MaintenanceEvent::Completed { .. } => "Maintenance pass completed",
        }
    }
}

// ============================================================================
// Entry Events
// ============================================================================

/// Events about individual cache entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EntryEvent {
    /// An entry was evicted to satisfy a size budget.
    Evicted {
        /// Namespace of the evicted entry.
        namespace: String,
        /// Key of the evicted entry.
        key: String,
        /// Size the eviction reclaimed, in bytes.
        size_bytes: u64,
    },
    /// An item was pinned for priority retention.
    Pinned {
        /// The pinned item id.
        item_id: String,
    },
    /// An item's pin was removed.
    Unpinned {
        /// The unpinned item id.
        item_id: String,
    },
}

impl EntryEvent {
    fn description(&self) -> &str {
        match self {
            EntryEvent::Evicted { .. } => "Entry evicted",
            EntryEvent::Pinned { .. } => "Item pinned",
            EntryEvent::Unpinned { .. } => "Item unpinned",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for cache events.
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CacheEvent) -> Result<usize, SendError<CacheEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
