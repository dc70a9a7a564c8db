//! Fingerprint-based duplicate detection
//!
//! A fingerprint is a SHA-256 digest over the normalized URL and, once they
//! are known, the normalized title and description. Fingerprinting happens
//! before any recipe page is fetched, so duplicates cost one store lookup.

mod service;

pub use service::{DuplicateCheck, FingerprintService};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A first-seen URL, recorded once and never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeFingerprint {
    pub provider_id: String,
    pub normalized_url: String,
    pub fingerprint: String,
    /// Saga run that first saw the URL
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Generates a deterministic fingerprint
///
/// `title` and `description` are reserved for content-based fingerprints;
/// URL-only callers pass `None`. Text inputs are trimmed, lowercased and
/// have their whitespace collapsed before hashing.
///
/// # Example
///
/// ```
/// use recipe_ingest::fingerprint::generate_fingerprint;
///
/// let a = generate_fingerprint("https://example.com/recipe/pie", None, None);
/// let b = generate_fingerprint("https://example.com/recipe/pie", None, None);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn generate_fingerprint(
    normalized_url: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());

    for part in [title, description].into_iter().flatten() {
        let text = normalize_text(part);
        if !text.is_empty() {
            hasher.update(b"|");
            hasher.update(text.as_bytes());
        }
    }

    hex::encode(hasher.finalize())
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
