//! Recipe / category / irrelevant link classification

use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use url::Url;

/// Path fragments that mark a recipe page when no provider pattern is configured
pub const DEFAULT_RECIPE_MARKERS: &[&str] = &[
    "/recipe/",
    "/recipes/",
    "/food/recipe",
    "/cooking/recipe",
    "/r/",
    "/dish/",
];

/// Path fragments that mark a listing page worth recursing into
pub const DEFAULT_CATEGORY_MARKERS: &[&str] = &[
    "/category",
    "/categories",
    "/tag",
    "/tags",
    "/collection",
    "/cuisine",
    "/meal-type",
    "/recipes",
];

/// Path fragments that are never a recipe or a category
pub const EXCLUDED_MARKERS: &[&str] = &[
    "/about",
    "/contact",
    "/privacy",
    "/terms",
    "/login",
    "/signup",
    "/cart",
    "/checkout",
    "/account",
    "/search",
];

/// Compiled regex size ceiling for provider-supplied patterns
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// What a discovered link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Recipe,
    Category,
    Irrelevant,
}

/// Provider-specific URL patterns, compiled once
///
/// A pattern that fails to compile is dropped, and classification for that
/// kind falls back to the default substring rules.
#[derive(Debug, Clone, Default)]
pub struct UrlPatterns {
    recipe: Option<Regex>,
    category: Option<Regex>,
}

impl UrlPatterns {
    /// Compiles the given patterns case-insensitively
    pub fn compile(recipe: Option<&str>, category: Option<&str>) -> Self {
        Self {
            recipe: recipe.and_then(|p| compile_pattern("recipe", p)),
            category: category.and_then(|p| compile_pattern("category", p)),
        }
    }

    pub fn has_recipe_pattern(&self) -> bool {
        self.recipe.is_some()
    }

    pub fn has_category_pattern(&self) -> bool {
        self.category.is_some()
    }
}

fn compile_pattern(kind: &str, pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(
                "Invalid {} URL pattern '{}', using default rules: {}",
                kind,
                pattern,
                e
            );
            None
        }
    }
}

/// Classifies links as recipe, category or irrelevant
///
/// Exclusions are checked first, then the recipe rule, then the category
/// rule. Each rule is the provider regex (matched against the full URL) when
/// one compiled, or the default substring list (matched against the
/// lowercased path) otherwise.
#[derive(Debug, Clone, Default)]
pub struct UrlClassifier {
    patterns: Arc<UrlPatterns>,
}

impl UrlClassifier {
    pub fn new(patterns: Arc<UrlPatterns>) -> Self {
        Self { patterns }
    }

    /// A classifier using only the default substring rules
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn classify(&self, url: &Url) -> LinkKind {
        let path = url.path().to_lowercase();

        if EXCLUDED_MARKERS.iter().any(|m| path.contains(m)) {
            return LinkKind::Irrelevant;
        }

        let is_recipe = match &self.patterns.recipe {
            Some(regex) => regex.is_match(url.as_str()),
            None => DEFAULT_RECIPE_MARKERS.iter().any(|m| path.contains(m)),
        };
        if is_recipe {
            return LinkKind::Recipe;
        }

        let is_category = match &self.patterns.category {
            Some(regex) => regex.is_match(url.as_str()),
            None => DEFAULT_CATEGORY_MARKERS.iter().any(|m| path.contains(m)),
        };
        if is_category {
            return LinkKind::Category;
        }

        LinkKind::Irrelevant
    }

    /// Confidence that a recipe link really is a recipe page
    pub fn confidence(url: &Url) -> f64 {
        let path = url.path().to_lowercase();
        if path.contains("/recipe/") || path.contains("/recipes/") {
            0.9
        } else if path.contains("/food/") || path.contains("/cooking/") {
            0.7
        } else {
            0.5
        }
    }
}
