//! # Identity Allocator
//!
//! Claims a document's government-facing identity. The serialization itself
//! lives in the store (a row lock in PostgreSQL, a per-tenant async lock in
//! memory); this type supplies the date, the fresh uuid and the lock wait.
//!
//! ```text
//!   allocate(tenant, document)
//!        │
//!        ▼
//!   store.allocate_identity ── lock tenant row (≤ lock_wait) ── LockTimeout
//!        │                      daily seq: reset on new date, +1
//!        │                      counter:   max(latest, starter) + 1
//!        │                      write tenant + document, commit
//!        ▼
//!   (daily_id, uuid, audit_counter)
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use fotara_db::{AllocationOutcome, AllocationRequest, FiscalStore};

use crate::clock::Clock;
use crate::error::SubmitResult;

pub struct IdentityAllocator {
    store: Arc<dyn FiscalStore>,
    clock: Arc<dyn Clock>,
    lock_wait: Duration,
}

impl IdentityAllocator {
    pub fn new(store: Arc<dyn FiscalStore>, clock: Arc<dyn Clock>, lock_wait: Duration) -> Self {
        IdentityAllocator {
            store,
            clock,
            lock_wait,
        }
    }

    /// Issues an identity for the document.
    ///
    /// A document that already has one gets it back with `fresh == false`
    /// and the tenant counters are left alone.
    ///
    /// ## Errors
    /// - `LockTimeout`: nothing was written, safe to retry
    /// - `NotFound`: tenant or document unknown
    pub async fn allocate(
        &self,
        tenant_ref: &str,
        document_ref: &str,
    ) -> SubmitResult<AllocationOutcome> {
        let request = AllocationRequest {
            tenant_ref: tenant_ref.to_string(),
            document_ref: document_ref.to_string(),
            today: self.clock.today(),
            uuid: Uuid::new_v4(),
            lock_wait: self.lock_wait,
        };

        debug!(tenant_ref, document_ref, today = %request.today, "Allocating identity");
        Ok(self.store.allocate_identity(&request).await?)
    }
}
