// src/application/commands/cart_commands.rs
//
// Cart & History Command Handlers
//
// Materials are addressed by matricula, or by id for rows stored without one.

use uuid::Uuid;

use crate::application::{dto::*, state::AppState};
use crate::error::{AppError, AppResult};

fn cart_dto(state: &AppState) -> CartDto {
    let cart = state.cart_service.cart();
    CartDto {
        total_units: cart.total_units(),
        export_text: cart.export_text(),
        lines: cart.lines().iter().cloned().map(CartLineDto::from).collect(),
    }
}

/// How a cart command names its material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialKey {
    Matricula(String),
    Id(Uuid),
}

impl MaterialKey {
    pub fn parse(raw: &str, by_id: bool) -> AppResult<Self> {
        let raw = raw.trim();
        if by_id {
            let id = Uuid::parse_str(raw)
                .map_err(|e| AppError::Validation(format!("Invalid material id: {}", e)))?;
            Ok(Self::Id(id))
        } else {
            Ok(Self::Matricula(raw.to_string()))
        }
    }
}

/// Material id of the cart line named by `key`
fn line_material_id(state: &AppState, key: &MaterialKey) -> AppResult<Uuid> {
    let cart = state.cart_service.cart();
    let line = match key {
        MaterialKey::Matricula(matricula) => {
            cart.lines().iter().find(|line| &line.matricula == matricula)
        }
        MaterialKey::Id(id) => cart.lines().iter().find(|line| line.material_id == *id),
    };
    line.map(|line| line.material_id).ok_or_else(|| {
        let shown = match key {
            MaterialKey::Matricula(matricula) => matricula.clone(),
            MaterialKey::Id(id) => id.to_string(),
        };
        AppError::Validation(format!("'{}' is not in the cart", shown))
    })
}

pub fn show_cart(state: &AppState) -> AppResult<CartDto> {
    Ok(cart_dto(state))
}

pub fn add_to_cart(state: &AppState, key: &MaterialKey) -> AppResult<CartDto> {
    let line = match key {
        MaterialKey::Matricula(matricula) => state.cart_service.add_by_matricula(matricula)?,
        MaterialKey::Id(id) => state.cart_service.add_by_id(*id)?,
    };
    log::info!("{} ({}) x{} in cart", line.nombre, line.material_id, line.qty);
    Ok(cart_dto(state))
}

pub fn remove_from_cart(state: &AppState, key: &MaterialKey) -> AppResult<CartDto> {
    let material_id = line_material_id(state, key)?;
    state.cart_service.remove(material_id)?;
    Ok(cart_dto(state))
}

pub fn set_cart_qty(state: &AppState, key: &MaterialKey, qty: u32) -> AppResult<CartDto> {
    let material_id = line_material_id(state, key)?;
    state.cart_service.set_qty(material_id, qty)?;
    Ok(cart_dto(state))
}

pub fn clear_cart(state: &AppState) -> AppResult<CartDto> {
    state.cart_service.clear()?;
    Ok(cart_dto(state))
}

pub fn checkout_cart(state: &AppState) -> AppResult<CheckoutDto> {
    Ok(CheckoutDto::from(state.cart_service.checkout()?))
}

pub fn list_history(state: &AppState, limit: Option<usize>) -> AppResult<SnapshotListDto> {
    let limit = limit.unwrap_or(state.config.history.limit);
    let snapshots = state.cart_service.list_history(limit)?;
    Ok(SnapshotListDto {
        snapshots: snapshots.into_iter().map(SnapshotDto::from).collect(),
    })
}

pub fn export_snapshot(state: &AppState, snapshot_id: &str) -> AppResult<ExportDto> {
    let id = Uuid::parse_str(snapshot_id.trim())
        .map_err(|e| AppError::Validation(format!("Invalid snapshot id: {}", e)))?;
    Ok(ExportDto {
        text: state.cart_service.export_snapshot(id)?,
    })
}
