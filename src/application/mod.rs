// src/application/mod.rs
//
// Application Layer
//
// ARCHITECTURE:
// - This layer sits ABOVE services and repositories
// - It provides the boundary between a front end and the services
// - It owns session wiring (AppState) and error presentation
// - It translates between DTOs and domain entities

pub mod cli;
pub mod commands;
pub mod dto;
pub mod error_handling;
pub mod state;

pub use dto::*;
pub use error_handling::{ErrorResponse, ErrorType};
pub use state::{AppState, UpdateRequest};
