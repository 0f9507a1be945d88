// src/integrations/mod.rs
//
// External Integrations Module

pub mod http;

pub use http::client::{AssetFetcher, HttpFetcher};

#[cfg(test)]
pub use http::client::MockAssetFetcher;
