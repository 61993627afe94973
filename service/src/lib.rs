//! Mapping cache service: durable identity mappings plus live activity
//! collection, sitting between burnout analysis and the provider API.
//!
//! The split of responsibilities:
//! - [`record`]: the append-only mapping record model and cache
//!   classification rules.
//! - [`store`]: SQLite persistence for records.
//! - [`summary`]: per-user activity summaries derived from raw counts.
//! - [`service`]: batch orchestration tying cache, matcher and provider
//!   together.

mod record;
mod service;
mod store;
mod summary;

pub use record::CacheStatus;
pub use record::MappingMethod;
pub use record::MappingRecord;
pub use record::NewMapping;
pub use record::UNKNOWN_TARGET;
pub use record::classify;
pub use service::BatchOutcome;
pub use service::MappingService;
pub use service::ServiceConfig;
pub use service::ServiceError;
pub use store::CacheStatistics;
pub use store::MappingStore;
pub use store::StoreError;
pub use summary::ActivitySummary;
