use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{DomainError, DomainResult};

/// Enumerated generation identifier. Each install attempt gets the next number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenerationId(pub u32);

impl GenerationId {
    pub fn next(self) -> Self {
        GenerationId(self.0.saturating_add(1))
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Lifecycle of one cache generation.
///
/// ```text
/// Installing -> Installed -> Active -> Superseded -> Deleted
///      \                                               ^
///       `----------------(install failed)--------------'
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Manifest entries are being fetched
    Installing,
    /// Every entry is cached; waiting to take over
    Installed,
    /// Serving intercepted requests
    Active,
    /// Replaced by a newer generation; entries about to be dropped
    Superseded,
    /// Entries deleted
    Deleted,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationState::Installing => "installing",
            GenerationState::Installed => "installed",
            GenerationState::Active => "active",
            GenerationState::Superseded => "superseded",
            GenerationState::Deleted => "deleted",
        }
    }

    pub fn can_transition_to(&self, next: GenerationState) -> bool {
        use GenerationState::*;
        matches!(
            (self, next),
            (Installing, Installed)
                | (Installing, Deleted)
                | (Installed, Active)
                | (Installed, Superseded)
                | (Active, Superseded)
                | (Superseded, Deleted)
        )
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installing" => Ok(GenerationState::Installing),
            "installed" => Ok(GenerationState::Installed),
            "active" => Ok(GenerationState::Active),
            "superseded" => Ok(GenerationState::Superseded),
            "deleted" => Ok(GenerationState::Deleted),
            other => Err(DomainError::InvariantViolation(format!(
                "Unknown generation state '{}'",
                other
            ))),
        }
    }
}

/// One versioned set of cached assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub id: GenerationId,
    /// Digest of the manifest this generation was installed from
    pub manifest_digest: String,
    pub state: GenerationState,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl Generation {
    pub fn new(id: GenerationId, manifest_digest: String) -> Self {
        Self {
            id,
            manifest_digest,
            state: GenerationState::Installing,
            created_at: Utc::now(),
            activated_at: None,
        }
    }

    /// Move to the next lifecycle state, rejecting illegal jumps.
    pub fn transition(&mut self, next: GenerationState) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition(format!(
                "{}: {} -> {}",
                self.id, self.state, next
            )));
        }
        if next == GenerationState::Active {
            self.activated_at = Some(Utc::now());
        }
        self.state = next;
        Ok(())
    }

    pub fn is_waiting(&self) -> bool {
        self.state == GenerationState::Installed
    }
}
