// src/services/cart_service.rs
//
// Cart / order staging.
//
// RULES:
// - Every mutation is persisted to the cart slot before it becomes visible
// - A missing or unreadable cart blob loads as an empty cart
// - Checkout records a snapshot and keeps the cart; clearing is explicit

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Cart, CartLine, Material, Snapshot};
use crate::error::{AppError, AppResult};
use crate::events::{CartCheckedOut, EventBus};
use crate::repositories::slot_repository::CART_SLOT;
use crate::repositories::{MaterialRepository, SlotRepository, SnapshotRepository};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutReceipt {
    pub snapshot_id: Uuid,
    pub line_count: usize,
    /// `<matricula>, <qty>` lines ready to paste
    pub export_text: String,
}

pub struct CartService {
    slot_repo: Arc<dyn SlotRepository>,
    snapshot_repo: Arc<dyn SnapshotRepository>,
    material_repo: Arc<dyn MaterialRepository>,
    event_bus: Arc<EventBus>,
    cart: Mutex<Cart>,
}

impl CartService {
    /// Create the service and restore the persisted cart.
    pub fn load(
        slot_repo: Arc<dyn SlotRepository>,
        snapshot_repo: Arc<dyn SnapshotRepository>,
        material_repo: Arc<dyn MaterialRepository>,
        event_bus: Arc<EventBus>,
    ) -> AppResult<Self> {
        let cart = match slot_repo.get(CART_SLOT)? {
            None => Cart::new(),
            Some(blob) => serde_json::from_str::<Cart>(&blob).unwrap_or_else(|e| {
                log::warn!("Discarding unreadable cart blob: {}", e);
                Cart::new()
            }),
        };
        log::debug!("Cart restored with {} lines", cart.len());

        Ok(Self {
            slot_repo,
            snapshot_repo,
            material_repo,
            event_bus,
            cart: Mutex::new(cart),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Cart> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy, persist it, then publish it.
    fn mutate<T, F>(&self, change: F) -> AppResult<T>
    where
        F: FnOnce(&mut Cart) -> T,
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let result = change(&mut next);
        let blob = serde_json::to_string(&next)?;
        self.slot_repo.put(CART_SLOT, &blob)?;
        *guard = next;
        Ok(result)
    }

    pub fn cart(&self) -> Cart {
        self.lock().clone()
    }

    /// Add one unit of `material`.
    pub fn add(&self, material: &Material) -> AppResult<CartLine> {
        self.mutate(|cart| cart.add(material).clone())
    }

    pub fn add_by_id(&self, material_id: Uuid) -> AppResult<CartLine> {
        let material = self
            .material_repo
            .get_by_id(material_id)?
            .ok_or(AppError::NotFound)?;
        self.add(&material)
    }

    pub fn add_by_matricula(&self, matricula: &str) -> AppResult<CartLine> {
        let material = self
            .material_repo
            .find_by_matricula(matricula)?
            .ok_or(AppError::NotFound)?;
        self.add(&material)
    }

    pub fn remove(&self, material_id: Uuid) -> AppResult<bool> {
        self.mutate(|cart| cart.remove(material_id))
    }

    /// Set a line's quantity; values below 1 are raised to 1.
    pub fn set_qty(&self, material_id: Uuid, qty: u32) -> AppResult<CartLine> {
        self.mutate(|cart| cart.set_qty(material_id, qty).cloned())?
            .ok_or(AppError::NotFound)
    }

    pub fn clear(&self) -> AppResult<()> {
        self.mutate(Cart::clear)
    }

    pub fn export_text(&self) -> String {
        self.lock().export_text()
    }

    /// Record the current cart as a snapshot and return its export text.
    pub fn checkout(&self) -> AppResult<CheckoutReceipt> {
        let cart = self.cart();
        if cart.is_empty() {
            return Err(AppError::Validation("Cart is empty".to_string()));
        }

        let snapshot = Snapshot::new(cart.lines().to_vec());
        self.snapshot_repo.add(&snapshot)?;

        log::info!(
            "Checkout recorded snapshot {} with {} lines",
            snapshot.id,
            snapshot.line_count()
        );
        self.event_bus.emit(CartCheckedOut::new(
            snapshot.id,
            snapshot.line_count(),
            cart.total_units(),
        ));

        Ok(CheckoutReceipt {
            snapshot_id: snapshot.id,
            line_count: snapshot.line_count(),
            export_text: snapshot.export_text(),
        })
    }

    /// Most recent snapshots first
    pub fn list_history(&self, limit: usize) -> AppResult<Vec<Snapshot>> {
        self.snapshot_repo.list_recent(limit)
    }

    pub fn export_snapshot(&self, id: Uuid) -> AppResult<String> {
        let snapshot = self.snapshot_repo.get_by_id(id)?.ok_or(AppError::NotFound)?;
        Ok(snapshot.export_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, initialize_database, ConnectionPool};
    use crate::domain::MaterialDraft;
    use crate::repositories::{SqliteMaterialRepository, SqliteSlotRepository, SqliteSnapshotRepository};

    fn pool() -> Arc<ConnectionPool> {
        let pool = create_memory_pool().unwrap();
        initialize_database(&pool.get().unwrap()).unwrap();
        Arc::new(pool)
    }

    fn cart_service(pool: &Arc<ConnectionPool>) -> CartService {
        CartService::load(
            Arc::new(SqliteSlotRepository::new(pool.clone())),
            Arc::new(SqliteSnapshotRepository::new(pool.clone())),
            Arc::new(SqliteMaterialRepository::new(pool.clone())),
            Arc::new(EventBus::new()),
        )
        .unwrap()
    }

    fn seed(pool: &Arc<ConnectionPool>) -> (Material, Material) {
        let repo = SqliteMaterialRepository::new(pool.clone());
        repo.upsert_by_matricula(&[
            MaterialDraft::new("A1", "Tornillo", 10, 0.5),
            MaterialDraft::new("A2", "Tuerca", 0, 0.3),
        ])
        .unwrap();
        (
            repo.find_by_matricula("A1").unwrap().unwrap(),
            repo.find_by_matricula("A2").unwrap().unwrap(),
        )
    }

    #[test]
    fn test_add_twice_increments() {
        let pool = pool();
        let (tornillo, _) = seed(&pool);
        let service = cart_service(&pool);

        service.add(&tornillo).unwrap();
        let line = service.add(&tornillo).unwrap();

        assert_eq!(line.qty, 2);
        assert_eq!(service.cart().len(), 1);
        assert_eq!(service.export_text(), "A1, 2");
    }

    #[test]
    fn test_cart_survives_reload() {
        let pool = pool();
        let (tornillo, tuerca) = seed(&pool);
        {
            let service = cart_service(&pool);
            service.add(&tornillo).unwrap();
            service.add_by_matricula("A2").unwrap();
            service.set_qty(tuerca.id, 5).unwrap();
        }

        let reloaded = cart_service(&pool);
        assert_eq!(reloaded.export_text(), "A1, 1\nA2, 5");
    }

    #[test]
    fn test_corrupt_blob_loads_empty() {
        let pool = pool();
        SqliteSlotRepository::new(pool.clone()).put(CART_SLOT, "{not json").unwrap();

        let service = cart_service(&pool);
        assert!(service.cart().is_empty());
    }

    #[test]
    fn test_set_qty_clamps_and_unknown_line() {
        let pool = pool();
        let (tornillo, tuerca) = seed(&pool);
        let service = cart_service(&pool);
        service.add(&tornillo).unwrap();

        assert_eq!(service.set_qty(tornillo.id, 0).unwrap().qty, 1);
        assert!(matches!(service.set_qty(tuerca.id, 3), Err(AppError::NotFound)));
    }

    #[test]
    fn test_remove_and_clear() {
        let pool = pool();
        let (tornillo, tuerca) = seed(&pool);
        let service = cart_service(&pool);
        service.add_by_id(tornillo.id).unwrap();
        service.add_by_id(tuerca.id).unwrap();

        assert!(service.remove(tornillo.id).unwrap());
        assert!(!service.remove(tornillo.id).unwrap());
        assert_eq!(service.export_text(), "A2, 1");

        service.clear().unwrap();
        assert!(service.cart().is_empty());
        assert!(cart_service(&pool).cart().is_empty());
    }

    #[test]
    fn test_checkout_empty_cart_is_rejected() {
        let pool = pool();
        let service = cart_service(&pool);
        assert!(matches!(service.checkout(), Err(AppError::Validation(_))));
        assert!(service.list_history(20).unwrap().is_empty());
    }

    #[test]
    fn test_checkout_records_snapshot_and_keeps_cart() {
        let pool = pool();
        let (tornillo, tuerca) = seed(&pool);
        let service = cart_service(&pool);
        service.add(&tornillo).unwrap();
        service.add(&tornillo).unwrap();
        service.add(&tuerca).unwrap();

        let receipt = service.checkout().unwrap();
        assert_eq!(receipt.export_text, "A1, 2\nA2, 1");
        assert_eq!(receipt.line_count, 2);
        assert_eq!(service.cart().len(), 2);

        let history = service.list_history(20).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, receipt.snapshot_id);
        assert_eq!(service.export_snapshot(receipt.snapshot_id).unwrap(), "A1, 2\nA2, 1");
    }

    #[test]
    fn test_snapshot_is_immutable_after_cart_changes() {
        let pool = pool();
        let (tornillo, _) = seed(&pool);
        let service = cart_service(&pool);
        service.add(&tornillo).unwrap();
        let receipt = service.checkout().unwrap();

        service.set_qty(tornillo.id, 9).unwrap();
        assert_eq!(service.export_snapshot(receipt.snapshot_id).unwrap(), "A1, 1");
    }

    #[test]
    fn test_lines_survive_material_deletion() {
        let pool = pool();
        let (tornillo, _) = seed(&pool);
        let service = cart_service(&pool);
        service.add(&tornillo).unwrap();

        SqliteMaterialRepository::new(pool.clone()).delete(tornillo.id).unwrap();
        assert_eq!(service.export_text(), "A1, 1");
        assert!(matches!(service.add_by_id(tornillo.id), Err(AppError::NotFound)));
    }

    #[test]
    fn test_export_unknown_snapshot() {
        let pool = pool();
        let service = cart_service(&pool);
        assert!(matches!(service.export_snapshot(Uuid::new_v4()), Err(AppError::NotFound)));
    }
}
