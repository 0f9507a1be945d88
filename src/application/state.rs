// src/application/state.rs
//
// Session controller.
//
// Owns every service for one session, wires event reactions between them
// and runs the asset control loop.
//
// RULES:
// - Services are built here and nowhere else
// - Reactions to events live here, not inside the services
// - A user-requested update never cuts over while an import is running

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::db::{create_connection_pool, get_database_path, initialize_database, ConnectionPool};
use crate::domain::Manifest;
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, ImportCancelled, ImportCompleted, ImportFailed, ImportStarted};
use crate::integrations::{AssetFetcher, HttpFetcher};
use crate::repositories::*;
use crate::search::SearchOptions;
use crate::services::*;

/// How a requested update was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRequest {
    /// `SKIP_WAITING` went to the control loop
    Sent,
    /// An import is running; `SKIP_WAITING` goes out when it ends
    Deferred,
}

/// Holds back `SKIP_WAITING` while a bulk import is in flight.
#[derive(Default)]
struct UpdateGate {
    importing: AtomicBool,
    pending: AtomicBool,
    control: Mutex<Option<UnboundedSender<ControlMessage>>>,
}

impl UpdateGate {
    fn request(&self) -> AppResult<UpdateRequest> {
        self.ensure_control()?;
        if self.importing.load(Ordering::SeqCst) {
            self.pending.store(true, Ordering::SeqCst);
            log::info!("Update deferred until the running import ends");
            return Ok(UpdateRequest::Deferred);
        }
        self.send(ControlMessage::SkipWaiting)?;
        Ok(UpdateRequest::Sent)
    }

    fn import_started(&self) {
        self.importing.store(true, Ordering::SeqCst);
    }

    fn import_finished(&self) {
        self.importing.store(false, Ordering::SeqCst);
        if self.pending.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.send(ControlMessage::SkipWaiting) {
                log::error!("Deferred update could not be sent: {}", e);
            }
        }
    }

    fn ensure_control(&self) -> AppResult<()> {
        match self.control.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(_) => Ok(()),
            None => Err(not_configured()),
        }
    }

    fn send(&self, message: ControlMessage) -> AppResult<()> {
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        match control.as_ref() {
            Some(sender) => sender
                .send(message)
                .map_err(|_| AppError::Other("Control loop is not running".to_string())),
            None => Err(not_configured()),
        }
    }

    fn close(&self) {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn not_configured() -> AppError {
    AppError::Validation("Asset cache is not configured (assets.base_url)".to_string())
}

/// Everything one session needs, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub pool: Arc<ConnectionPool>,
    pub event_bus: Arc<EventBus>,
    pub import_service: Arc<ImportService>,
    pub catalog_service: Arc<CatalogService>,
    pub cart_service: Arc<CartService>,
    /// Present when `assets.base_url` is configured
    pub asset_cache: Option<Arc<AssetCacheManager>>,
    updates: Arc<UpdateGate>,
    shutdown: CancellationToken,
    control_task: Option<JoinHandle<()>>,
}

impl AppState {
    /// Open the on-disk store under the configured data directory.
    pub async fn open(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let data_dir = config.data_dir()?;
        let db_path = get_database_path(&data_dir, &config.storage.database_file)?;
        let pool = create_connection_pool(&db_path, config.storage.pool_size)?;
        {
            let conn = pool.get()?;
            initialize_database(&conn)?;
        }
        log::info!("Opened store at {}", db_path.display());

        let fetcher: Arc<dyn AssetFetcher> =
            Arc::new(HttpFetcher::new(config.assets.fetch_timeout())?);
        Self::with_parts(config, Arc::new(pool), fetcher).await
    }

    /// Build the session over an initialized pool and a fetcher.
    pub async fn with_parts(
        config: AppConfig,
        pool: Arc<ConnectionPool>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> AppResult<Self> {
        let event_bus = Arc::new(EventBus::new());

        // REPOSITORIES
        let material_repo: Arc<dyn MaterialRepository> =
            Arc::new(SqliteMaterialRepository::new(pool.clone()));
        let snapshot_repo: Arc<dyn SnapshotRepository> =
            Arc::new(SqliteSnapshotRepository::new(pool.clone()));
        let slot_repo: Arc<dyn SlotRepository> = Arc::new(SqliteSlotRepository::new(pool.clone()));
        let cache_repo: Arc<dyn AssetCacheRepository> =
            Arc::new(SqliteAssetCacheRepository::new(pool.clone()));

        // SERVICES
        let import_service = Arc::new(ImportService::new(
            material_repo.clone(),
            event_bus.clone(),
            ImportOptions {
                chunk_bytes: config.import.chunk_bytes,
                batch_size: config.import.batch_size,
            },
        ));
        let catalog_service = Arc::new(CatalogService::new(
            material_repo.clone(),
            event_bus.clone(),
            CatalogSettings {
                options: SearchOptions {
                    fuzzy: config.search.fuzzy,
                    prefix: config.search.prefix,
                },
                page_size: config.search.page_size,
                result_limit: config.search.result_limit,
                suggestion_limit: config.search.suggestion_limit,
            },
        ));
        let cart_service = Arc::new(CartService::load(
            slot_repo,
            snapshot_repo,
            material_repo,
            event_bus.clone(),
        )?);

        let asset_cache = match &config.assets.base_url {
            Some(base_url) => {
                let manifest = Manifest::new(
                    base_url,
                    config.assets.manifest_version.clone(),
                    config.assets.entries.clone(),
                    config.assets.offline_document.clone(),
                )?;
                Some(Arc::new(AssetCacheManager::new(
                    cache_repo,
                    fetcher,
                    event_bus.clone(),
                    manifest,
                )))
            }
            None => None,
        };

        // CONTROL LOOP
        let shutdown = CancellationToken::new();
        let updates = Arc::new(UpdateGate::default());
        let control_task = asset_cache.as_ref().map(|manager| {
            let (sender, receiver) = control_channel();
            *updates.control.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
            spawn_control_loop(manager.clone(), receiver, shutdown.child_token())
        });

        let state = Self {
            config,
            pool,
            event_bus,
            import_service,
            catalog_service,
            cart_service,
            asset_cache,
            updates,
            shutdown,
            control_task,
        };
        state.register_event_handlers();
        Ok(state)
    }

    // ========================================================================
    // EVENT WIRING
    // ========================================================================

    fn register_event_handlers(&self) {
        let gate = Arc::clone(&self.updates);
        self.event_bus.subscribe::<ImportStarted, _>(move |_| gate.import_started());

        let catalog: Weak<CatalogService> = Arc::downgrade(&self.catalog_service);
        let gate = Arc::clone(&self.updates);
        self.event_bus.subscribe::<ImportCompleted, _>(move |event| {
            if let Some(catalog) = catalog.upgrade() {
                if let Err(e) = catalog.rebuild_index() {
                    log::error!("Index rebuild after import {} failed: {}", event.import_id, e);
                    catalog.invalidate_index();
                }
            }
            gate.import_finished();
        });

        let catalog: Weak<CatalogService> = Arc::downgrade(&self.catalog_service);
        let gate = Arc::clone(&self.updates);
        self.event_bus.subscribe::<ImportCancelled, _>(move |_| {
            if let Some(catalog) = catalog.upgrade() {
                catalog.invalidate_index();
            }
            gate.import_finished();
        });

        // Batches flushed before a failure stay committed
        let catalog: Weak<CatalogService> = Arc::downgrade(&self.catalog_service);
        let gate = Arc::clone(&self.updates);
        self.event_bus.subscribe::<ImportFailed, _>(move |_| {
            if let Some(catalog) = catalog.upgrade() {
                catalog.invalidate_index();
            }
            gate.import_finished();
        });
    }

    // ========================================================================
    // SESSION OPERATIONS
    // ========================================================================

    /// Token for one cancellable operation; cancelled on shutdown too.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn import_in_flight(&self) -> bool {
        self.updates.importing.load(Ordering::SeqCst)
    }

    /// Ask the waiting asset generation to take over.
    pub fn request_update(&self) -> AppResult<UpdateRequest> {
        self.updates.request()
    }

    pub fn asset_cache(&self) -> AppResult<&Arc<AssetCacheManager>> {
        self.asset_cache.as_ref().ok_or_else(not_configured)
    }

    /// Drain pending control messages, then cancel whatever is still running.
    pub async fn shutdown(mut self) -> AppResult<()> {
        self.updates.close();
        if let Some(task) = self.control_task.take() {
            if let Err(e) = task.await {
                log::error!("Control loop ended abnormally: {}", e);
            }
        }
        self.shutdown.cancel();
        log::debug!("Session closed");
        Ok(())
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use crate::domain::AssetResponse;
    use crate::integrations::MockAssetFetcher;
    use std::io::Cursor;

    fn memory_pool() -> Arc<ConnectionPool> {
        let pool = create_memory_pool().unwrap();
        initialize_database(&pool.get().unwrap()).unwrap();
        Arc::new(pool)
    }

    fn serving_fetcher() -> Arc<dyn AssetFetcher> {
        let mut mock = MockAssetFetcher::new();
        mock.expect_fetch().returning(|request| {
            Ok(AssetResponse::new(request.request_key(), 200, "ok"))
        });
        Arc::new(mock)
    }

    fn config_with_assets() -> AppConfig {
        let mut config = AppConfig::default();
        config.assets.base_url = Some("https://almacen.test/".to_string());
        config
    }

    #[tokio::test]
    async fn test_completed_import_rebuilds_index() {
        let state = AppState::with_parts(AppConfig::default(), memory_pool(), serving_fetcher())
            .await
            .unwrap();
        let data = "codigo,descripcion\nA1,Tornillo\nA2,Tuerca\n";
        let mapping = ColumnMapping::suggest(&["codigo".to_string(), "descripcion".to_string()]);

        state
            .import_service
            .import_reader("inline", Cursor::new(data), &mapping, |_| {}, &state.cancellation_token())
            .await
            .unwrap();

        assert!(state.catalog_service.is_index_built());
        assert!(!state.import_in_flight());
        state.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_import_invalidates_index() {
        let state = AppState::with_parts(AppConfig::default(), memory_pool(), serving_fetcher())
            .await
            .unwrap();
        state.catalog_service.rebuild_index().unwrap();
        let cancel = state.cancellation_token();
        cancel.cancel();
        let mapping = ColumnMapping::suggest(&["codigo".to_string()]);

        let outcome = state
            .import_service
            .import_reader("inline", Cursor::new("codigo\nA1\n"), &mapping, |_| {}, &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(!state.catalog_service.is_index_built());
    }

    #[tokio::test]
    async fn test_update_without_asset_cache_is_rejected() {
        let state = AppState::with_parts(AppConfig::default(), memory_pool(), serving_fetcher())
            .await
            .unwrap();
        assert!(matches!(state.request_update(), Err(AppError::Validation(_))));
        assert!(state.asset_cache().is_err());
    }

    #[tokio::test]
    async fn test_update_without_asset_cache_is_rejected_while_importing() {
        let state = AppState::with_parts(AppConfig::default(), memory_pool(), serving_fetcher())
            .await
            .unwrap();
        state.updates.import_started();

        assert!(matches!(state.request_update(), Err(AppError::Validation(_))));
        assert!(!state.updates.pending.load(Ordering::SeqCst));
        state.updates.import_finished();
    }

    #[tokio::test]
    async fn test_update_deferred_while_importing() {
        let state = AppState::with_parts(config_with_assets(), memory_pool(), serving_fetcher())
            .await
            .unwrap();
        let manager = state.asset_cache().unwrap().clone();
        manager.install().await.unwrap();

        // A newer manifest installs as waiting behind an attached client
        let newer = AssetCacheManager::new(
            Arc::new(SqliteAssetCacheRepository::new(state.pool.clone())),
            serving_fetcher(),
            state.event_bus.clone(),
            Manifest::new(
                "https://almacen.test/",
                "v2",
                state.config.assets.entries.clone(),
                "offline.html",
            )
            .unwrap(),
        );
        let _session = newer.attach_client();
        newer.install().await.unwrap();
        assert!(manager.waiting_generation().unwrap().is_some());

        state.updates.import_started();
        assert_eq!(state.request_update().unwrap(), UpdateRequest::Deferred);
        tokio::task::yield_now().await;
        assert!(manager.waiting_generation().unwrap().is_some());

        state.updates.import_finished();
        state.shutdown().await.unwrap();

        assert!(manager.waiting_generation().unwrap().is_none());
        assert_eq!(manager.active_generation().unwrap().unwrap().id.0, 2);
    }

    #[tokio::test]
    async fn test_update_sent_when_idle() {
        let state = AppState::with_parts(config_with_assets(), memory_pool(), serving_fetcher())
            .await
            .unwrap();
        assert_eq!(state.request_update().unwrap(), UpdateRequest::Sent);
        state.shutdown().await.unwrap();
    }
}
