// src/services/mod.rs
//
// Services Module - Orchestration Layer
//
// RULES:
// - Services own behavior; repositories own persistence
// - Every operation is a plain method, callable without the event bus
// - Events are published after state is persisted

pub mod asset_cache_manager;
pub mod cart_service;
pub mod catalog_service;
pub mod control;
pub mod import_service;


pub use asset_cache_manager::{
    AssetCacheManager, CacheStatus, ClientSession, InstallOutcome, RouteOutcome,
};

pub use cart_service::{CartService, CheckoutReceipt};

pub use catalog_service::{CatalogService, CatalogSettings, StockFilter};

pub use control::{control_channel, handle_control, spawn_control_loop, ControlMessage};

pub use import_service::{
    coerce_number, coerce_stock, ColumnMapping, ImportOptions, ImportOutcome, ImportPreview,
    ImportProgress, ImportService,
};
