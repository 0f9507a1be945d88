// src/events/mod.rs
//
// Internal Event System - Public API
//
// EventHandler is internal to the bus and is not exported.

pub mod bus;
pub mod types;

pub use types::DomainEvent;

pub use types::{
    // Cart
    CartCheckedOut,
    // Asset cache
    GenerationActivated,
    GenerationInstallFailed,
    GenerationInstalled,
    // Import
    ImportCancelled,
    ImportCompleted,
    ImportFailed,
    ImportStarted,
    // Search
    SearchIndexRebuilt,
};

pub use bus::{EventBus, EventLogEntry};

