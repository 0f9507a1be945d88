pub mod generation;
pub mod manifest;
pub mod request;

pub use generation::{Generation, GenerationId, GenerationState};
pub use manifest::Manifest;
pub use request::{match_key, request_key, AssetRequest, AssetResponse, ResponseSource};
