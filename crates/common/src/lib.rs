//! FoodDrop Common Library
//!
//! Shared code for the FoodDrop services including:
//! - Session bootstrap and role-based access routing
//! - Identity provider (credentials, sessions)
//! - Database models and repository patterns
//! - Restaurant input validation
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod metrics;
pub mod restaurants;

// Re-export commonly used types
pub use bootstrap::{AccessControl, BootstrapOutcome, Destination, ProfileStore, Role};
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use identity::{DbIdentityProvider, IdentityProvider};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
