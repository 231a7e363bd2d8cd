//! # fotara-db: Storage Layer for the Submission Pipeline
//!
//! Durable state of the pipeline behind one trait, [`FiscalStore`], with a
//! PostgreSQL implementation ([`Database`]) and an in-process one
//! ([`MemoryStore`]).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fotara Data Flow                                 │
//! │                                                                         │
//! │  SubmissionOrchestrator (fotara-submit)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     fotara-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  FiscalStore  │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (trait)     │    │ tenant        │    │  (embedded)  │  │   │
//! │  │   │               │    │ document      │    │              │  │   │
//! │  │   │ Database ─────┼───►│ log           │    │ 0001_...sql  │  │   │
//! │  │   │ MemoryStore   │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     PostgreSQL                                  │   │
//! │  │   fiscal_tenants • fiscal_documents • fiscal_submission_logs    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `FiscalStore` trait and its record types
//! - [`pool`] - Connection pool and the PostgreSQL `FiscalStore`
//! - [`memory`] - In-memory `FiscalStore`
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (tenant, document, log)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fotara_db::{Database, DbConfig, FiscalStore};
//!
//! let db = Database::new(DbConfig::new(url)).await?;
//! let tenant = db.get_tenant("t1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use store::{
    AllocationOutcome, AllocationRequest, AttemptOutcome, FiscalStore, RedriveCandidate,
    TenantCredentials, TenantRecord, TenantUpsert,
};

// Repository re-exports for convenience
pub use repository::document::DocumentRepository;
pub use repository::log::SubmissionLogRepository;
pub use repository::tenant::TenantRepository;
