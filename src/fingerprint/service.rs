use crate::fingerprint::{generate_fingerprint, RecipeFingerprint};
use crate::storage::FingerprintStore;
use crate::url::normalize_url;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of checking a URL against the fingerprint store
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    /// Never seen before
    New {
        normalized_url: String,
        fingerprint: String,
    },
    /// Already recorded by this saga run, for example before a crash
    OwnRecord {
        normalized_url: String,
        fingerprint: String,
    },
    /// Recorded by an earlier run
    Duplicate {
        normalized_url: String,
        fingerprint: String,
    },
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::Duplicate { .. })
    }

    pub fn normalized_url(&self) -> &str {
        match self {
            DuplicateCheck::New { normalized_url, .. }
            | DuplicateCheck::OwnRecord { normalized_url, .. }
            | DuplicateCheck::Duplicate { normalized_url, .. } => normalized_url,
        }
    }

    pub fn fingerprint(&self) -> &str {
        match self {
            DuplicateCheck::New { fingerprint, .. }
            | DuplicateCheck::OwnRecord { fingerprint, .. }
            | DuplicateCheck::Duplicate { fingerprint, .. } => fingerprint,
        }
    }
}

/// Duplicate detection over a fingerprint store
pub struct FingerprintService {
    store: Arc<dyn FingerprintStore>,
}

impl FingerprintService {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// Checks whether a provider already has a fingerprint, without loading the record
    pub fn is_duplicate(&self, provider_id: &str, fingerprint: &str) -> Result<bool> {
        Ok(self.store.fingerprint_exists(provider_id, fingerprint)?)
    }

    /// Normalizes a URL and checks it against a provider's records on behalf of a saga run
    pub fn check(
        &self,
        provider_id: &str,
        url: &str,
        correlation_id: Uuid,
    ) -> Result<DuplicateCheck> {
        let normalized_url = normalize_url(url)?.to_string();
        let fingerprint = generate_fingerprint(&normalized_url, None, None);

        let Some(record) = self.store.find_fingerprint(provider_id, &normalized_url)? else {
            return Ok(DuplicateCheck::New {
                normalized_url,
                fingerprint,
            });
        };

        if record.correlation_id == correlation_id {
            Ok(DuplicateCheck::OwnRecord {
                normalized_url,
                fingerprint,
            })
        } else {
            Ok(DuplicateCheck::Duplicate {
                normalized_url,
                fingerprint,
            })
        }
    }

    /// Records a URL once it has been processed or has failed for good
    ///
    /// Returns false if a record already existed.
    pub fn record(
        &self,
        provider_id: &str,
        normalized_url: &str,
        fingerprint: &str,
        correlation_id: Uuid,
    ) -> Result<bool> {
        let record = RecipeFingerprint {
            provider_id: provider_id.to_string(),
            normalized_url: normalized_url.to_string(),
            fingerprint: fingerprint.to_string(),
            correlation_id,
            created_at: Utc::now(),
        };

        Ok(self.store.insert_fingerprint(&record)?)
    }
}
