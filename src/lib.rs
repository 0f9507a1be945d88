// src/lib.rs
// Almacen Offline - offline-first inventory browser and order staging
//
// Architecture:
// - Local-first: every material, cart and snapshot lives in SQLite
// - Event-driven: services publish facts; the session controller reacts
// - Explicit: every core operation is a plain method
// - Versioned assets: cached responses cut over one generation at a time

pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod integrations;
pub mod repositories;
pub mod search;
pub mod services;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use application::AppState;
pub use config::AppConfig;
pub use domain::{
    AssetRequest, AssetResponse, Cart, CartLine, Generation, GenerationId, GenerationState,
    Manifest, Material, MaterialDraft, Snapshot,
};
pub use error::{AppError, AppResult};
pub use events::EventBus;
pub use services::{
    AssetCacheManager, CartService, CatalogService, ColumnMapping, ImportService, StockFilter,
};
