// ── Directory listing iterator ────────────────────────────────────────────────
//
// The wire protocol expects a directory read loop to get its entries in one
// batch and a terminating EOF on the next call. Each open directory path
// runs the cycle Unconsumed → Consumed → (cursor removed), so a fresh
// OPENDIR/READDIR sequence on the same path behaves exactly like the first.

use std::collections::HashMap;

use crate::protocol::FileAttrs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    /// No entries returned yet; the next READDIR emits the full batch.
    Unconsumed,
    /// Batch already emitted; the next READDIR emits EOF and retires the
    /// cursor.
    Consumed,
}

/// Outcome of advancing a directory cursor once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingStep {
    /// The complete listing for this cycle.
    Batch(Vec<(String, FileAttrs)>),
    /// Listing exhausted; the cursor has been reset.
    End,
}

/// Per-session directory cursors, keyed by directory path.
#[derive(Debug, Default)]
pub struct DirListings {
    cursors: HashMap<String, CursorState>,
}

impl DirListings {
    /// Start (or restart) a cycle for `path`. Called on OPENDIR.
    pub fn open(&mut self, path: &str) {
        self.cursors.insert(path.to_string(), CursorState::Unconsumed);
    }

    /// Advance the cursor for `path` one step. A READDIR without a prior
    /// OPENDIR behaves as Unconsumed.
    pub fn advance(&mut self, path: &str, entries: Vec<(String, FileAttrs)>) -> ListingStep {
        match self.cursors.get(path).copied().unwrap_or(CursorState::Unconsumed) {
            CursorState::Unconsumed => {
                self.cursors.insert(path.to_string(), CursorState::Consumed);
                ListingStep::Batch(entries)
            }
            CursorState::Consumed => {
                self.cursors.remove(path);
                ListingStep::End
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<(String, FileAttrs)> {
        vec![("/d/a".to_string(), FileAttrs::default())]
    }

    #[test]
    fn first_call_batches_second_call_ends() {
        let mut listings = DirListings::default();
        listings.open("/d");
        assert_eq!(listings.advance("/d", entries()), ListingStep::Batch(entries()));
        assert_eq!(listings.advance("/d", entries()), ListingStep::End);
    }

    #[test]
    fn cycle_restarts_after_end() {
        let mut listings = DirListings::default();
        listings.open("/d");
        listings.advance("/d", entries());
        listings.advance("/d", entries());
        // Third call behaves like a fresh first call.
        listings.open("/d");
        assert_eq!(listings.advance("/d", entries()), ListingStep::Batch(entries()));
    }

    #[test]
    fn readdir_without_opendir_still_batches_once() {
        let mut listings = DirListings::default();
        assert_eq!(listings.advance("/d", entries()), ListingStep::Batch(entries()));
        assert_eq!(listings.advance("/d", entries()), ListingStep::End);
    }

    #[test]
    fn cursors_are_independent_per_path() {
        let mut listings = DirListings::default();
        listings.open("/a");
        listings.open("/b");
        assert!(matches!(listings.advance("/a", vec![]), ListingStep::Batch(_)));
        assert!(matches!(listings.advance("/b", vec![]), ListingStep::Batch(_)));
        assert_eq!(listings.advance("/a", vec![]), ListingStep::End);
    }
}
