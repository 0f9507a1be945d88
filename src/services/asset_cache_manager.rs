// src/services/asset_cache_manager.rs
//
// Asset Cache Manager
//
// Versioned cache of network responses with atomic generation cutover.
//
// LIFECYCLE:
//   install  -> fetch every manifest entry, commit all or nothing
//   activate -> the waiting generation takes over; older ones are retired
//   gc       -> retired generations lose their entries during activation
//
// RULES:
// - Install and activation are serialized by one async mutex
// - A failed install never disturbs the active generation
// - Routing only reads and writes the active generation
// - Nothing here touches the material store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::{Method, Url};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::asset::request_key;
use crate::domain::{
    AssetRequest, AssetResponse, Generation, GenerationId, GenerationState, Manifest,
    ResponseSource,
};
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, GenerationActivated, GenerationInstallFailed, GenerationInstalled};
use crate::integrations::AssetFetcher;
use crate::repositories::{AssetCacheRepository, CachedEntry};

/// What the interceptor decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Not handled here; the caller performs the request itself
    PassThrough,
    Respond(AssetResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// A generation for the current manifest is already active or waiting
    UpToDate { generation: GenerationId },
    Installed {
        generation: GenerationId,
        entry_count: usize,
        activated: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub manifest_digest: String,
    pub active: Option<Generation>,
    pub waiting: Option<Generation>,
    pub active_entry_count: u64,
    pub attached_clients: usize,
    pub generations: Vec<Generation>,
}

/// Keeps a client session attached while alive.
pub struct ClientSession {
    clients: Arc<AtomicUsize>,
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AssetCacheManager {
    cache_repo: Arc<dyn AssetCacheRepository>,
    fetcher: Arc<dyn AssetFetcher>,
    event_bus: Arc<EventBus>,
    manifest: Manifest,
    lifecycle: Mutex<()>,
    clients: Arc<AtomicUsize>,
}

impl AssetCacheManager {
    pub fn new(
        cache_repo: Arc<dyn AssetCacheRepository>,
        fetcher: Arc<dyn AssetFetcher>,
        event_bus: Arc<EventBus>,
        manifest: Manifest,
    ) -> Self {
        Self {
            cache_repo,
            fetcher,
            event_bus,
            manifest,
            lifecycle: Mutex::new(()),
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    // ========================================================================
    // CLIENTS
    // ========================================================================

    /// Register a client session; a waiting generation will not take over
    /// on its own while any session is attached.
    pub fn attach_client(&self) -> ClientSession {
        self.clients.fetch_add(1, Ordering::SeqCst);
        ClientSession {
            clients: Arc::clone(&self.clients),
        }
    }

    pub fn attached_clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn active_generation(&self) -> AppResult<Option<Generation>> {
        Ok(self
            .cache_repo
            .list_by_state(GenerationState::Active)?
            .into_iter()
            .last())
    }

    /// Newest installed generation waiting to take over
    pub fn waiting_generation(&self) -> AppResult<Option<Generation>> {
        Ok(self
            .cache_repo
            .list_by_state(GenerationState::Installed)?
            .into_iter()
            .last())
    }

    pub fn status(&self) -> AppResult<CacheStatus> {
        let active = self.active_generation()?;
        let active_entry_count = match &active {
            Some(generation) => self.cache_repo.entry_count(generation.id)?,
            None => 0,
        };
        Ok(CacheStatus {
            manifest_digest: self.manifest.digest()?,
            waiting: self.waiting_generation()?,
            active,
            active_entry_count,
            attached_clients: self.attached_clients(),
            generations: self.cache_repo.list_generations()?,
        })
    }

    // ========================================================================
    // INSTALL
    // ========================================================================

    /// Discard generations left in `Installing` by an interrupted run, then
    /// install the current manifest if needed.
    pub async fn startup(&self) -> AppResult<InstallOutcome> {
        self.discard_interrupted().await?;
        self.install().await
    }

    pub async fn discard_interrupted(&self) -> AppResult<usize> {
        let _guard = self.lifecycle.lock().await;
        let leftovers = self.cache_repo.list_by_state(GenerationState::Installing)?;
        for mut generation in leftovers.iter().cloned() {
            log::warn!("Discarding interrupted install of {}", generation.id);
            generation.transition(GenerationState::Deleted)?;
            self.cache_repo.discard_generation(&generation)?;
        }
        Ok(leftovers.len())
    }

    /// Install a generation for the current manifest unless one is already
    /// active or waiting. Activates it right away when nothing is active or
    /// no client session is attached.
    pub async fn install(&self) -> AppResult<InstallOutcome> {
        let _guard = self.lifecycle.lock().await;
        let digest = self.manifest.digest()?;

        let current = self
            .cache_repo
            .list_generations()?
            .into_iter()
            .filter(|g| g.manifest_digest == digest)
            .filter(|g| matches!(g.state, GenerationState::Active | GenerationState::Installed))
            .last();
        if let Some(generation) = current {
            log::debug!("Manifest unchanged; {} is {}", generation.id, generation.state);
            if generation.is_waiting() && self.may_activate_unprompted()? {
                self.activate_locked(generation.clone())?;
            }
            return Ok(InstallOutcome::UpToDate {
                generation: generation.id,
            });
        }

        let mut generation = Generation::new(self.cache_repo.next_generation_id()?, digest);
        self.cache_repo.insert_generation(&generation)?;
        log::info!("Installing {} ({})", generation.id, self.manifest.version());

        let entries = match self.fetch_manifest(generation.id).await {
            Ok(entries) => entries,
            Err(err) => {
                generation.transition(GenerationState::Deleted)?;
                self.cache_repo.discard_generation(&generation)?;
                return Err(err);
            }
        };

        generation.transition(GenerationState::Installed)?;
        self.cache_repo.commit_install(&generation, &entries)?;
        log::info!("{} installed with {} entries", generation.id, entries.len());
        self.event_bus.emit(GenerationInstalled::new(
            generation.id.0,
            generation.manifest_digest.clone(),
            entries.len(),
        ));

        let activated = if self.may_activate_unprompted()? {
            self.activate_locked(generation.clone())?;
            true
        } else {
            log::info!(
                "{} waiting: {} client session(s) attached",
                generation.id,
                self.attached_clients()
            );
            false
        };

        Ok(InstallOutcome::Installed {
            generation: generation.id,
            entry_count: entries.len(),
            activated,
        })
    }

    async fn fetch_manifest(&self, generation: GenerationId) -> AppResult<Vec<CachedEntry>> {
        let urls = self.manifest.resolved_urls()?;
        let mut entries = Vec::with_capacity(urls.len());

        for url in urls {
            let request = AssetRequest::get(url.clone()).bypassing_cache();
            let failure = match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    entries.push(CachedEntry::from_response(generation, &url, &response));
                    continue;
                }
                Ok(response) => format!("HTTP status {}", response.status),
                Err(err) => err.to_string(),
            };

            log::error!("Install of {} failed at {}: {}", generation, url, failure);
            self.event_bus.emit(GenerationInstallFailed::new(
                generation.0,
                url.to_string(),
                failure.clone(),
            ));
            return Err(AppError::InstallFailed {
                generation: generation.0,
                url: url.to_string(),
                reason: failure,
            });
        }

        Ok(entries)
    }

    // ========================================================================
    // ACTIVATE
    // ========================================================================

    fn may_activate_unprompted(&self) -> AppResult<bool> {
        Ok(self.active_generation()?.is_none() || self.attached_clients() == 0)
    }

    /// Activate the waiting generation now, regardless of attached clients.
    pub async fn skip_waiting(&self) -> AppResult<Option<GenerationId>> {
        let _guard = self.lifecycle.lock().await;
        match self.waiting_generation()? {
            Some(generation) => {
                let id = generation.id;
                self.activate_locked(generation)?;
                Ok(Some(id))
            }
            None => {
                log::debug!("SKIP_WAITING with no waiting generation");
                Ok(None)
            }
        }
    }

    /// Activate the waiting generation if no client session is attached.
    pub async fn activate_if_idle(&self) -> AppResult<Option<GenerationId>> {
        let _guard = self.lifecycle.lock().await;
        if !self.may_activate_unprompted()? {
            return Ok(None);
        }
        match self.waiting_generation()? {
            Some(generation) => {
                let id = generation.id;
                self.activate_locked(generation)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Caller must hold the lifecycle lock.
    fn activate_locked(&self, mut target: Generation) -> AppResult<()> {
        let mut retired = Vec::new();
        for mut other in self.cache_repo.list_generations()? {
            if other.id == target.id {
                continue;
            }
            match other.state {
                GenerationState::Active | GenerationState::Installed => {
                    other.transition(GenerationState::Superseded)?;
                    other.transition(GenerationState::Deleted)?;
                    retired.push(other);
                }
                GenerationState::Superseded => {
                    other.transition(GenerationState::Deleted)?;
                    retired.push(other);
                }
                GenerationState::Installing | GenerationState::Deleted => {}
            }
        }

        target.transition(GenerationState::Active)?;
        self.cache_repo.commit_activation(&target, &retired)?;

        let retired_ids: Vec<u32> = retired.iter().map(|g| g.id.0).collect();
        log::info!("{} activated; retired {:?}", target.id, retired_ids);
        self.event_bus
            .emit(GenerationActivated::new(target.id.0, retired_ids));
        Ok(())
    }

    // ========================================================================
    // ROUTING
    // ========================================================================

    /// Route one intercepted request.
    ///
    /// Network failures with nothing cached to fall back on surface as
    /// `AppError::Network`.
    pub async fn handle(&self, request: &AssetRequest) -> AppResult<RouteOutcome> {
        if request.method != Method::GET {
            return Ok(RouteOutcome::PassThrough);
        }
        let response = if request.is_document() {
            self.network_first(request).await?
        } else {
            self.cache_first(request).await?
        };
        Ok(RouteOutcome::Respond(response))
    }

    /// Convenience for callers holding a URL string
    pub async fn fetch_url(&self, url: &str, document: bool) -> AppResult<RouteOutcome> {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(_) => self
                .manifest
                .resolve(url)
                .map_err(|e| AppError::Validation(e.to_string()))?,
        };
        let request = if document {
            AssetRequest::document(url)
        } else {
            AssetRequest::get(url)
        };
        self.handle(&request).await
    }

    async fn network_first(&self, request: &AssetRequest) -> AppResult<AssetResponse> {
        let fresh_request = request.clone().bypassing_cache();
        let network_error = match self.fetcher.fetch(&fresh_request).await {
            Ok(response) => {
                self.store_if_cacheable(&request.url, &response)?;
                return Ok(response);
            }
            Err(err) if err.is_network() => err,
            Err(err) => return Err(err),
        };

        log::debug!("Network failed for {}; trying cache", request.url);
        let Some(active) = self.active_generation()? else {
            return Err(network_error);
        };

        if let Some(entry) = self.cache_repo.match_entry(active.id, &request.match_key())? {
            return Ok(entry.into_response());
        }

        let offline_key = request_key(&self.manifest.offline_document_url()?);
        if let Some(entry) = self.cache_repo.find_entry(active.id, &offline_key)? {
            return Ok(entry.into_response().with_source(ResponseSource::OfflineFallback));
        }

        Err(network_error)
    }

    async fn cache_first(&self, request: &AssetRequest) -> AppResult<AssetResponse> {
        if let Some(active) = self.active_generation()? {
            let exact = self.cache_repo.find_entry(active.id, &request.request_key())?;
            let hit = match exact {
                Some(entry) => Some(entry),
                None => self.cache_repo.match_entry(active.id, &request.match_key())?,
            };
            if let Some(entry) = hit {
                return Ok(entry.into_response());
            }
        }

        let response = self.fetcher.fetch(request).await?;
        self.store_if_cacheable(&request.url, &response)?;
        Ok(response)
    }

    /// Store a 2xx network response in the active generation, overwriting.
    fn store_if_cacheable(&self, url: &Url, response: &AssetResponse) -> AppResult<()> {
        if !response.is_success() {
            return Ok(());
        }
        if let Some(active) = self.active_generation()? {
            self.cache_repo
                .put_entry(&CachedEntry::from_response(active.id, url, response))?;
        }
        Ok(())
    }
}
