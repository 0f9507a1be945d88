pub mod entity;

pub use entity::{export_lines, Cart, CartLine};
