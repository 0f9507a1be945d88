// src/search/mod.rs
//
// Search layer
//
// RULES:
// - The index is derived state, never persisted
// - The store stays authoritative; a stale index is rebuilt, not patched

mod index;
mod tokenizer;

pub use index::{IndexSnapshot, SearchHit, SearchIndex, SearchOptions};
pub use tokenizer::{normalize, tokenize};
