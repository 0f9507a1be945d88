// src/error/mod.rs

mod types;

pub use types::{AppError, AppResult};
