use super::entity::MaterialDraft;
use crate::domain::{DomainError, DomainResult};

/// Validates an import row before it reaches storage
pub fn validate_draft(draft: &MaterialDraft) -> DomainResult<()> {
    validate_identity(&draft.matricula, &draft.nombre)?;
    validate_precio(draft.precio)?;
    Ok(())
}

/// A stored material needs a code or a name
fn validate_identity(matricula: &str, nombre: &str) -> DomainResult<()> {
    if matricula.trim().is_empty() && nombre.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "Material needs a matricula or a nombre".to_string(),
        ));
    }
    Ok(())
}

/// Prices are finite and never negative
fn validate_precio(precio: f64) -> DomainResult<()> {
    if !precio.is_finite() || precio < 0.0 {
        return Err(DomainError::InvariantViolation(format!(
            "Invalid precio {}",
            precio
        )));
    }
    Ok(())
}

/// Invariants that must hold true for Material domain:
///
/// 1. Identity (UUID) is immutable across merges
/// 2. At most one material per non-empty matricula after a merge
/// 3. Materials without matricula are never merged, always inserted
/// 4. Blank rows (no matricula, no nombre) are never stored
/// 5. Stock is an integer >= 0 (enforced by the type)
/// 6. Precio is finite and >= 0
