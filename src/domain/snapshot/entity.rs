use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cart::{export_lines, CartLine};

/// An immutable copy of the cart taken when the user sends an order.
/// Snapshots are written once and only ever read back for re-export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub items: Vec<CartLine>,
}

impl Snapshot {
    pub fn new(items: Vec<CartLine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            items,
        }
    }

    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    pub fn export_text(&self) -> String {
        export_lines(&self.items)
    }
}
