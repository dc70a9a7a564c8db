//! Provider configuration
//!
//! - `ProviderConfiguration`: per-provider discovery, rate and batch settings
//! - `ProviderConfigCache`: TTL cache over the configuration store, also
//!   owning the compiled URL patterns derived from each configuration

mod cache;
mod types;

pub use cache::{ProviderConfigCache, DEFAULT_CACHE_TTL};
pub use types::{DiscoveryStrategyKind, ProviderConfiguration};
