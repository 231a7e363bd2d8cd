//! # fotara-core: Pure Fiscal Logic
//!
//! Everything about a fiscal document that can be decided without I/O:
//! counter arithmetic, nine-decimal recomputation, payload assembly and
//! UBL rendering.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Fotara Submission Pipeline                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 fotara-gateway (HTTP, axum)                     │   │
//! │  │   PUT tenant ──► PUT document ──► POST submit ──► GET status    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            fotara-submit (orchestrator, transport, redrive)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fotara-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  amount   │  │  counter  │  │  payload  │  │   │
//! │  │   │ Document  │  │ 9 places  │  │ ICV, day  │  │  builder  │  │   │
//! │  │   │  Tenant   │  │ half-away │  │  sequence │  │  + ubl    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          fotara-db (PostgreSQL, row locks, audit log)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (FiscalDocument, TenantFiscalConfig, Identity, ...)
//! - [`amount`] - Nine-decimal `Amount`
//! - [`counter`] - Audit counter and daily id advance
//! - [`payload`] - Payload builder
//! - [`ubl`] - UBL 2.1 rendering
//! - [`error`] - Domain error types
//! - [`validation`] - Intake validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use fotara_core::types::CounterState;
//! use uuid::Uuid;
//!
//! let state = CounterState::starting_at(99);
//! let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//! let alloc = state.advance("ACME", today, Uuid::new_v4());
//!
//! assert_eq!(alloc.identity.audit_counter, 100);
//! assert_eq!(alloc.identity.daily_id, "ACME-2024-03-01-00001");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod amount;
pub mod counter;
pub mod error;
pub mod payload;
pub mod types;
pub mod ubl;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use amount::Amount;
pub use counter::Allocation;
pub use error::{CoreError, CoreResult, ValidationError};
pub use payload::{BuildContext, FiscalPayload};
pub use types::*;
