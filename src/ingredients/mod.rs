//! Ingredient normalization
//!
//! Maps raw ingredient codes reported for a recipe to canonical names. A
//! code without a mapping comes back as `None`; the saga reports those and
//! carries on.

use std::collections::HashMap;

/// Maps raw ingredient codes to canonical forms
pub trait IngredientNormalizer: Send + Sync {
    /// Returns one entry per distinct input code
    fn normalize(&self, provider_id: &str, codes: &[String]) -> HashMap<String, Option<String>>;
}

/// Normalizer backed by a fixed lookup table
///
/// Keys are matched case-insensitively after trimming.
#[derive(Debug, Clone, Default)]
pub struct TableIngredientNormalizer {
    table: HashMap<String, String>,
}

impl TableIngredientNormalizer {
    pub fn new(mappings: &HashMap<String, String>) -> Self {
        Self {
            table: mappings
                .iter()
                .map(|(code, canonical)| (normalize_key(code), canonical.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn normalize_key(code: &str) -> String {
    code.trim().to_lowercase()
}

impl IngredientNormalizer for TableIngredientNormalizer {
    fn normalize(&self, _provider_id: &str, codes: &[String]) -> HashMap<String, Option<String>> {
        codes
            .iter()
            .map(|code| (code.clone(), self.table.get(&normalize_key(code)).cloned()))
            .collect()
    }
}
