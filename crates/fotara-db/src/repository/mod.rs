//! # Repository Module
//!
//! PostgreSQL repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  FiscalStore for Database                                              │
//! │       │                                                                 │
//! │       │  db.documents().allocate_identity(&request)                    │
//! │       ▼                                                                 │
//! │  TenantRepository         fiscal_tenants                               │
//! │  ├── upsert, get                                                       │
//! │  DocumentRepository       fiscal_documents (+ tenant row lock)         │
//! │  ├── upsert, get, allocate_identity, record_outcome, list_redrivable   │
//! │  SubmissionLogRepository  fiscal_submission_logs                       │
//! │  └── append, list_for_document                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod document;
pub mod log;
pub mod tenant;
