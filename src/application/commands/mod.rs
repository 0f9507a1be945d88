// src/application/commands/mod.rs
//
// Command Handlers
//
// ARCHITECTURE:
// - Commands are thin adapters between a front end and Services
// - Commands accept plain arguments, return DTOs
// - Commands NEVER contain business logic

pub mod asset_commands;
pub mod cart_commands;
pub mod catalog_commands;
pub mod db_commands;

pub use asset_commands::*;
pub use cart_commands::*;
pub use catalog_commands::*;
pub use db_commands::*;
