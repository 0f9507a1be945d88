// src/services/control.rs
//
// Control channel for the asset cache.
//
// Messages arrive as JSON (`{"type":"SKIP_WAITING"}`) from a client or from
// the session controller, and are handled by a single control loop task.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::services::asset_cache_manager::AssetCacheManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate the waiting generation immediately
    SkipWaiting,
}

impl ControlMessage {
    pub fn parse(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("Unknown control message '{}': {}", raw, e)))
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Apply one control message to the cache.
pub async fn handle_control(manager: &AssetCacheManager, message: ControlMessage) -> AppResult<()> {
    match message {
        ControlMessage::SkipWaiting => {
            match manager.skip_waiting().await? {
                Some(generation) => log::info!("Control: {} now active", generation),
                None => log::info!("Control: nothing waiting"),
            }
            Ok(())
        }
    }
}

pub fn control_channel() -> (UnboundedSender<ControlMessage>, UnboundedReceiver<ControlMessage>) {
    mpsc::unbounded_channel()
}

/// Spawn the control loop. It runs until the token is cancelled or every
/// sender is dropped.
pub fn spawn_control_loop(
    manager: Arc<AssetCacheManager>,
    mut receiver: UnboundedReceiver<ControlMessage>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = receiver.recv() => {
                    let Some(message) = message else { break };
                    log::debug!("Control message: {:?}", message);
                    if let Err(e) = handle_control(&manager, message).await {
                        log::error!("Control message {:?} failed: {}", message, e);
                    }
                }
            }
        }
        log::debug!("Control loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skip_waiting() {
        let message = ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(message, ControlMessage::SkipWaiting);
        assert_eq!(message.to_json().unwrap(), r#"{"type":"SKIP_WAITING"}"#);
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = ControlMessage::parse(r#"{"type":"RELOAD"}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(ControlMessage::parse("SKIP_WAITING").is_err());
    }
}
