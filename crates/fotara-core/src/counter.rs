//! # Counter Advance
//!
//! The arithmetic half of identity allocation. Storage takes the lock and
//! persists; this module only decides what the next identity is.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 CounterState::advance(abbr, today, uuid)                │
//! │                                                                         │
//! │  Daily sequence                                                        │
//! │  ──────────────                                                        │
//! │  last_daily_seq_date == today ?  seq = last + 1                        │
//! │                               :  seq = 1        (new calendar day)     │
//! │  daily_id = "<abbr>-<YYYY-MM-DD>-<seq:05>"      e.g. ACME-2024-03-01-00007
//! │                                                                         │
//! │  Audit counter                                                         │
//! │  ─────────────                                                         │
//! │  next = max(latest_issued, starter) + 1         never resets           │
//! │                                                                         │
//! │  New state                                                             │
//! │  ─────────                                                             │
//! │  latest_issued = next, last_daily_seq_date = today,                    │
//! │  last_daily_seq_number = seq, starter unchanged                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use uuid::Uuid;

use crate::types::{CounterState, Identity};

/// Result of one advance: the identity to hand out and the state to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub identity: Identity,
    pub next: CounterState,
}

impl CounterState {
    /// Creates a fresh counter starting after `starter_counter`.
    pub fn starting_at(starter_counter: i64) -> Self {
        CounterState {
            starter_counter,
            ..Default::default()
        }
    }

    /// The audit counter the next allocation will receive.
    #[inline]
    pub fn next_audit_counter(&self) -> i64 {
        self.latest_issued_counter.max(self.starter_counter) + 1
    }

    /// The daily sequence number the next allocation on `today` will receive.
    #[inline]
    pub fn next_daily_seq(&self, today: NaiveDate) -> i64 {
        match self.last_daily_seq_date {
            Some(date) if date == today => self.last_daily_seq_number + 1,
            _ => 1,
        }
    }

    /// Computes the next identity and the counter state to write back.
    ///
    /// Pure: the caller holds the tenant lock and supplies the uuid.
    pub fn advance(&self, abbreviation: &str, today: NaiveDate, uuid: Uuid) -> Allocation {
        let audit_counter = self.next_audit_counter();
        let seq = self.next_daily_seq(today);

        Allocation {
            identity: Identity {
                daily_id: format_daily_id(abbreviation, today, seq),
                uuid,
                audit_counter,
            },
            next: CounterState {
                starter_counter: self.starter_counter,
                latest_issued_counter: audit_counter,
                last_daily_seq_date: Some(today),
                last_daily_seq_number: seq,
            },
        }
    }
}

/// Formats `<abbr>-<YYYY-MM-DD>-<seq>` with a five-digit zero-padded sequence.
pub fn format_daily_id(abbreviation: &str, date: NaiveDate, seq: i64) -> String {
    format!("{}-{}-{:05}", abbreviation, date.format("%Y-%m-%d"), seq)
}

// =============================================================================
// Unit Tests
// =============================================================================
