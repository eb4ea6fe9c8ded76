//! Page daemon - external collaborator stub.
//!
//! The pageout daemon's scan/reclaim algorithm (the two-handed clock,
//! laundry list, dirty-page writeback) lives outside this crate's scope.
//! What this crate owns is the wake contract that `page_queues` and
//! `paging_control` depend on: when the deferred-inactive queues grow
//! past threshold or a waiter blocks in `vm_wait`, something needs to be
//! told "pages are needed" and, eventually, to wake back up whoever was
//! waiting once pages are available. This module is that seam, kept
//! just wide enough for the rest of the tree (`vm_fault`, `mod::init`)
//! to keep calling into it the way they always have.

use crate::mach_vm::paging_control;

/// Nudge the daemon. Delegates to the actual wake logic in
/// `paging_control`, which parks/unparks threads on the
/// `VM_PAGEOUT_PAGES_NEEDED` wait channel.
pub fn wakeup() {
    paging_control::pagedaemon_wakeup();
}

/// Pages requested since the daemon last serviced demand.
pub fn pages_needed() -> u32 {
    paging_control::pages_needed_count()
}

/// Kept for init-sequence parity with `mod::init`; the daemon process
/// itself is started elsewhere.
pub fn init() {}

/// Kept for init-sequence parity with `mod::init_with_memory`.
pub fn configure(_total_pages: u32) {}

/// Kept for init-sequence parity; no in-crate daemon thread to start.
pub fn start() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeup_is_harmless_with_no_waiters() {
        wakeup();
        assert_eq!(pages_needed(), 0);
    }
}
