use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog row: one material the warehouse can stage in an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Internal immutable identifier
    pub id: Uuid,

    /// Business material code (SKU-like). May be empty.
    pub matricula: String,

    /// Short description shown to the user
    pub nombre: String,

    /// Units available, never negative
    pub stock: u64,

    /// Unit price, finite and never negative
    pub precio: f64,

    /// Last time this row was written by an import
    pub updated_at: DateTime<Utc>,
}

/// A mapped import row, before it is merged into the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaterialDraft {
    pub matricula: String,
    pub nombre: String,
    pub stock: u64,
    pub precio: f64,
}

impl MaterialDraft {
    pub fn new(
        matricula: impl Into<String>,
        nombre: impl Into<String>,
        stock: u64,
        precio: f64,
    ) -> Self {
        Self {
            matricula: matricula.into().trim().to_string(),
            nombre: nombre.into().trim().to_string(),
            stock,
            precio,
        }
    }

    /// Blank lines carry neither a code nor a name and are never stored.
    pub fn is_blank(&self) -> bool {
        self.matricula.is_empty() && self.nombre.is_empty()
    }

    /// Only rows with a code take part in the merge-by-matricula rule.
    pub fn has_matricula(&self) -> bool {
        !self.matricula.is_empty()
    }
}

impl Material {
    /// Create a new Material from an import row
    pub fn from_draft(draft: &MaterialDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            matricula: draft.matricula.clone(),
            nombre: draft.nombre.clone(),
            stock: draft.stock,
            precio: draft.precio,
            updated_at: Utc::now(),
        }
    }

    /// Overwrite every field except `id` with the incoming row.
    ///
    /// This is a full overwrite, not a field-level merge: a later import row
    /// replaces price and stock even when they are zero.
    pub fn overwrite_with(&mut self, draft: &MaterialDraft) {
        self.matricula = draft.matricula.clone();
        self.nombre = draft.nombre.clone();
        self.stock = draft.stock;
        self.precio = draft.precio;
        self.updated_at = Utc::now();
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_trims_text_fields() {
        let draft = MaterialDraft::new("  A1 ", " Tornillo\t", 3, 0.5);
        assert_eq!(draft.matricula, "A1");
        assert_eq!(draft.nombre, "Tornillo");
    }

    #[test]
    fn test_blank_detection() {
        assert!(MaterialDraft::new("", "", 5, 1.0).is_blank());
        assert!(!MaterialDraft::new("", "Arandela", 0, 0.0).is_blank());
        assert!(!MaterialDraft::new("A9", "", 0, 0.0).is_blank());
    }

    #[test]
    fn test_overwrite_keeps_identity() {
        let mut material = Material::from_draft(&MaterialDraft::new("A1", "Tornillo", 10, 0.5));
        let id = material.id;

        material.overwrite_with(&MaterialDraft::new("A1", "Tornillo M6", 0, 0.0));

        assert_eq!(material.id, id);
        assert_eq!(material.nombre, "Tornillo M6");
        assert_eq!(material.stock, 0);
        assert_eq!(material.precio, 0.0);
    }
}
