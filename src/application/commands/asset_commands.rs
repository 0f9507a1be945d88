// src/application/commands/asset_commands.rs
//
// Asset Cache Command Handlers

use crate::application::{dto::*, state::AppState};
use crate::error::AppResult;
use crate::services::{CacheStatus, InstallOutcome, RouteOutcome};

/// Recover interrupted installs, then install the configured manifest
pub async fn install_assets(state: &AppState) -> AppResult<InstallOutcome> {
    state.asset_cache()?.startup().await
}

pub fn asset_status(state: &AppState) -> AppResult<CacheStatus> {
    state.asset_cache()?.status()
}

/// Route one request through the cache, as a client page would
pub async fn fetch_asset(state: &AppState, url: &str, document: bool) -> AppResult<FetchResultDto> {
    let manager = state.asset_cache()?;
    let _session = manager.attach_client();
    let result = match manager.fetch_url(url, document).await? {
        RouteOutcome::PassThrough => FetchResultDto {
            url: url.to_string(),
            source: "pass_through".to_string(),
            status: None,
            content_type: None,
            bytes: 0,
        },
        RouteOutcome::Respond(response) => FetchResultDto {
            url: response.url.clone(),
            source: response.source.as_str().to_string(),
            status: Some(response.status),
            content_type: response.header("content-type").map(str::to_string),
            bytes: response.body.len(),
        },
    };
    Ok(result)
}

/// Send `SKIP_WAITING`, or defer it while an import runs
pub fn skip_waiting(state: &AppState) -> AppResult<UpdateDto> {
    Ok(UpdateDto {
        result: state.request_update()?,
    })
}
