pub mod entity;
pub mod invariants;

pub use entity::{Material, MaterialDraft};
pub use invariants::validate_draft;
