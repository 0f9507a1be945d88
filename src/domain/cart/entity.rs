use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::material::Material;

/// One staged order line.
///
/// `material_id` is a weak reference: the material may disappear from the
/// store later, so code and name are copied for display and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub material_id: Uuid,
    pub matricula: String,
    pub nombre: String,
    pub qty: u32,
}

impl CartLine {
    pub fn for_material(material: &Material) -> Self {
        Self {
            material_id: material.id,
            matricula: material.matricula.clone(),
            nombre: material.nombre.clone(),
            qty: 1,
        }
    }
}

/// The working order: an ordered list of lines, one per material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn total_units(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.qty)).sum()
    }

    /// Add one unit of a material; repeated adds bump the existing line.
    pub fn add(&mut self, material: &Material) -> &CartLine {
        let idx = match self.position(material.id) {
            Some(idx) => {
                let line = &mut self.lines[idx];
                line.qty = line.qty.saturating_add(1);
                idx
            }
            None => {
                self.lines.push(CartLine::for_material(material));
                self.lines.len() - 1
            }
        };
        &self.lines[idx]
    }

    /// Remove a line. Returns false when the material was not in the cart.
    pub fn remove(&mut self, material_id: Uuid) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.material_id != material_id);
        self.lines.len() != before
    }

    /// Set a line's quantity. Values below 1 are clamped to 1.
    pub fn set_qty(&mut self, material_id: Uuid, qty: u32) -> Option<&CartLine> {
        let idx = self.position(material_id)?;
        self.lines[idx].qty = qty.max(1);
        Some(&self.lines[idx])
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Text for pasting into the ERP line-item field.
    pub fn export_text(&self) -> String {
        export_lines(&self.lines)
    }

    fn position(&self, material_id: Uuid) -> Option<usize> {
        self.lines.iter().position(|l| l.material_id == material_id)
    }
}

/// `<matricula>, <qty>` per line, newline separated, no header, no trailing newline.
pub fn export_lines(lines: &[CartLine]) -> String {
    lines
        .iter()
        .map(|l| format!("{}, {}", l.matricula, l.qty))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::material::MaterialDraft;

    fn material(code: &str, name: &str) -> Material {
        Material::from_draft(&MaterialDraft::new(code, name, 1, 1.0))
    }

    #[test]
    fn test_add_twice_increments_qty() {
        let tornillo = material("A1", "Tornillo");
        let mut cart = Cart::new();

        cart.add(&tornillo);
        let line = cart.add(&tornillo).clone();

        assert_eq!(cart.len(), 1);
        assert_eq!(line.qty, 2);
    }

    #[test]
    fn test_set_qty_clamps_to_one() {
        let tuerca = material("A2", "Tuerca");
        let mut cart = Cart::new();
        cart.add(&tuerca);

        let line = cart.set_qty(tuerca.id, 0).cloned();

        assert_eq!(line.map(|l| l.qty), Some(1));
    }

    #[test]
    fn test_set_qty_unknown_material() {
        let mut cart = Cart::new();
        assert!(cart.set_qty(Uuid::new_v4(), 3).is_none());
    }

    #[test]
    fn test_remove_line() {
        let a = material("A1", "Tornillo");
        let b = material("A2", "Tuerca");
        let mut cart = Cart::new();
        cart.add(&a);
        cart.add(&b);

        assert!(cart.remove(a.id));
        assert!(!cart.remove(a.id));
        assert_eq!(cart.lines()[0].matricula, "A2");
    }

    #[test]
    fn test_export_format() {
        let a = material("A1", "Tornillo");
        let b = material("B7", "Arandela");
        let mut cart = Cart::new();
        cart.add(&a);
        cart.add(&a);
        cart.add(&b);

        assert_eq!(cart.export_text(), "A1, 2\nB7, 1");
        assert_eq!(cart.total_units(), 3);
    }

    #[test]
    fn test_empty_export_is_empty_string() {
        assert_eq!(Cart::new().export_text(), "");
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let mut cart = Cart::new();
        cart.add(&material("A1", "Tornillo"));

        let json = serde_json::to_string(&cart).unwrap();
        assert!(json.starts_with('['));

        let back: Cart = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cart);
    }
}
