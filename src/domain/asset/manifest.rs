use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::domain::{DomainError, DomainResult};

/// The enumerated list of assets a generation must cache before it can serve.
///
/// Entries may be relative ("index.html", "./") or absolute
/// ("https://cdn.example.com/lib.js"). Relative entries resolve against
/// `base_url`, which is normalized to end in `/` so a deployment under a
/// sub-path keeps its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    base_url: Url,
    version: String,
    entries: Vec<String>,
    offline_document: String,
}

impl Manifest {
    pub fn new(
        base_url: &str,
        version: impl Into<String>,
        entries: Vec<String>,
        offline_document: impl Into<String>,
    ) -> DomainResult<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            DomainError::InvariantViolation(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        base_url.set_query(None);
        base_url.set_fragment(None);

        if entries.is_empty() {
            return Err(DomainError::InvariantViolation(
                "Asset manifest has no entries".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            version: version.into(),
            entries,
            offline_document: offline_document.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolve one entry against the base URL.
    pub fn resolve(&self, entry: &str) -> DomainResult<Url> {
        self.base_url.join(entry).map_err(|e| {
            DomainError::InvariantViolation(format!("Invalid manifest entry '{}': {}", entry, e))
        })
    }

    /// All entries resolved, duplicates removed, in manifest order.
    pub fn resolved_urls(&self) -> DomainResult<Vec<Url>> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let url = self.resolve(entry)?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    pub fn offline_document_url(&self) -> DomainResult<Url> {
        self.resolve(&self.offline_document)
    }

    /// SHA-256 over the version label and the sorted resolved URLs.
    ///
    /// Two manifests with the same digest describe the same generation, so a
    /// digest match means nothing needs to be installed.
    pub fn digest(&self) -> DomainResult<String> {
        let mut urls: Vec<String> = self
            .resolved_urls()?
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        urls.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        hasher.update([0u8]);
        for url in &urls {
            hasher.update(url.as_bytes());
            hasher.update([b'\n']);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}
