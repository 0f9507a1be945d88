// src/events/types.rs
//
// All domain events in the system.
// Each event represents an immutable fact that has already occurred.
//
// RULES:
// - Events are facts, not commands
// - Events are immutable
// - Events carry only the data needed to react
// - No business logic in event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trait that all domain events must implement
pub trait DomainEvent: std::fmt::Debug + Clone {
    /// Unique identifier for this event instance
    fn event_id(&self) -> Uuid;

    /// When this event occurred
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Human-readable event type name
    fn event_type(&self) -> &'static str;
}

macro_rules! domain_event {
    ($name:ident) => {
        impl DomainEvent for $name {
            fn event_id(&self) -> Uuid { self.event_id }
            fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
            fn event_type(&self) -> &'static str { stringify!($name) }
        }
    };
}

// ============================================================================
// IMPORT EVENTS
// ============================================================================

/// Emitted before the first chunk of an import is read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStarted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub import_id: Uuid,
    pub source: String,
}

impl ImportStarted {
    pub fn new(import_id: Uuid, source: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            import_id,
            source,
        }
    }
}

domain_event!(ImportStarted);

/// Emitted when every row of an import has been merged into the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportCompleted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub import_id: Uuid,
    pub rows_read: u64,
    pub rows_committed: u64,
    pub inserted: u64,
    pub updated: u64,
}

impl ImportCompleted {
    pub fn new(import_id: Uuid, rows_read: u64, rows_committed: u64, inserted: u64, updated: u64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            import_id,
            rows_read,
            rows_committed,
            inserted,
            updated,
        }
    }
}

domain_event!(ImportCompleted);

/// Emitted when the user cancelled an import. Flushed batches stay committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportCancelled {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub import_id: Uuid,
    pub rows_read: u64,
    pub rows_committed: u64,
}

impl ImportCancelled {
    pub fn new(import_id: Uuid, rows_read: u64, rows_committed: u64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            import_id,
            rows_read,
            rows_committed,
        }
    }
}

domain_event!(ImportCancelled);

/// Emitted when an import aborted on a parse or storage failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFailed {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub import_id: Uuid,
    pub rows_committed: u64,
    pub reason: String,
}

impl ImportFailed {
    pub fn new(import_id: Uuid, rows_committed: u64, reason: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            import_id,
            rows_committed,
            reason,
        }
    }
}

domain_event!(ImportFailed);

// ============================================================================
// SEARCH EVENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexRebuilt {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub entries: usize,
}

impl SearchIndexRebuilt {
    pub fn new(entries: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            entries,
        }
    }
}

domain_event!(SearchIndexRebuilt);

// ============================================================================
// CART EVENTS
// ============================================================================

/// Emitted when the cart was recorded as a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartCheckedOut {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub snapshot_id: Uuid,
    pub line_count: usize,
    pub total_units: u64,
}

impl CartCheckedOut {
    pub fn new(snapshot_id: Uuid, line_count: usize, total_units: u64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            snapshot_id,
            line_count,
            total_units,
        }
    }
}

domain_event!(CartCheckedOut);

// ============================================================================
// ASSET CACHE EVENTS
// ============================================================================

/// Emitted when every manifest entry of a generation is cached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInstalled {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub generation: u32,
    pub manifest_digest: String,
    pub entry_count: usize,
}

impl GenerationInstalled {
    pub fn new(generation: u32, manifest_digest: String, entry_count: usize) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            generation,
            manifest_digest,
            entry_count,
        }
    }
}

domain_event!(GenerationInstalled);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInstallFailed {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub generation: u32,
    pub url: String,
    pub reason: String,
}

impl GenerationInstallFailed {
    pub fn new(generation: u32, url: String, reason: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            generation,
            url,
            reason,
        }
    }
}

domain_event!(GenerationInstallFailed);

/// Emitted when a generation took over serving requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationActivated {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub generation: u32,
    /// Generations whose entries were dropped by this activation
    pub retired: Vec<u32>,
}

impl GenerationActivated {
    pub fn new(generation: u32, retired: Vec<u32>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            generation,
            retired,
        }
    }
}

domain_event!(GenerationActivated);
