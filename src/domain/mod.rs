// src/domain/mod.rs
//
// Domain Root - The Single Source of Truth for Domain API
//
// All other modules import from `crate::domain::*`

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod asset;
pub mod cart;
pub mod material;
pub mod snapshot;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Material Domain
pub use material::{validate_draft, Material, MaterialDraft};

// Cart & History
pub use cart::{export_lines, Cart, CartLine};
pub use snapshot::Snapshot;

// Asset Cache
pub use asset::{
    AssetRequest, AssetResponse, Generation, GenerationId, GenerationState, Manifest,
    ResponseSource,
};

// ============================================================================
// DOMAIN ERROR TYPES
// ============================================================================

use thiserror::Error;

/// Domain-level errors
/// These represent violations of business rules and invariants
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Entity not found: {0}")]
    NotFound(String),
}

/// Domain result type
pub type DomainResult<T> = Result<T, DomainError>;
