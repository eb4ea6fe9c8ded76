//! PagingControl - suspension points and the upward signal to the
//! page-out daemon.
//!
//! This module owns no pages itself; it is the narrow seam between the
//! resident-memory manager and its external collaborators named in the
//! system overview (the page-out/swap daemon, and whatever woke a thread
//! that is blocked on free-memory exhaustion).

use core::sync::atomic::{AtomicU32, Ordering};

use crate::kern::sched_prim::{self, WaitEvent};
use crate::mach_vm::free_pool;

/// Stable wait-channel key for "a free page became available". Any
/// static's address works as an event key (see `event_from_addr`); a
/// dedicated zero-sized marker keeps the channel from colliding with a
/// real page's busy-wait channel.
static VM_WAIT_CHANNEL: u8 = 0;
static VM_PFAULT_CHANNEL: u8 = 0;

fn vm_wait_event() -> WaitEvent {
    sched_prim::event_from_addr(&VM_WAIT_CHANNEL)
}
fn vm_pfault_event() -> WaitEvent {
    sched_prim::event_from_addr(&VM_PFAULT_CHANNEL)
}

/// Count of threads currently parked waiting for free memory; read by
/// the page-out daemon to decide whether it has work to do.
static VM_PAGEOUT_PAGES_NEEDED: AtomicU32 = AtomicU32::new(0);

/// Number of threads blocked in `vm_wait`/`vm_waitpfault`.
pub fn pages_needed_count() -> u32 {
    VM_PAGEOUT_PAGES_NEEDED.load(Ordering::SeqCst)
}

/// Block until the pool has pages again. Used by allocation paths that
/// cannot tolerate a NULL return (`grab` without NOWAIT). Wakes the
/// page-out daemon on entry so it knows more pressure has arrived.
pub fn vm_wait() {
    VM_PAGEOUT_PAGES_NEEDED.fetch_add(1, Ordering::SeqCst);
    pagedaemon_wakeup();
    sched_prim::thread_sleep(vm_wait_event(), true);
    VM_PAGEOUT_PAGES_NEEDED.fetch_sub(1, Ordering::SeqCst);
}

/// Variant used specifically on the page-fault path, kept as a distinct
/// wait channel so a targeted wakeup (e.g. after a single page is freed)
/// does not have to wake every generic `vm_wait` waiter too.
pub fn vm_waitpfault() {
    VM_PAGEOUT_PAGES_NEEDED.fetch_add(1, Ordering::SeqCst);
    pagedaemon_wakeup();
    sched_prim::thread_sleep(vm_pfault_event(), true);
    VM_PAGEOUT_PAGES_NEEDED.fetch_sub(1, Ordering::SeqCst);
}

/// Wake every thread parked in `vm_wait`/`vm_waitpfault`. Called whenever
/// pages are returned to FreePool.
pub fn wakeup_free_waiters() {
    sched_prim::thread_wakeup_prim(vm_wait_event(), false);
    sched_prim::thread_wakeup_prim(vm_pfault_event(), false);
}

/// Poke the page-out daemon: it is an external collaborator (the core
/// does not decide when to page out or perform I/O), so this only wakes
/// whatever is parked waiting to run a scan, rather than running one
/// itself.
pub fn pagedaemon_wakeup() {
    sched_prim::thread_wakeup_prim(sched_prim::event_from_addr(&VM_PAGEOUT_PAGES_NEEDED), false);
}

/// True once FreePool has dropped below its reserve and a waiter would
/// actually block if it called `vm_wait` right now. Exposed so the
/// page-out daemon and diagnostics (`show pginfo`) can report pressure
/// without taking a lock-ordering risk themselves.
pub fn is_memory_low() -> bool {
    free_pool::free_pool().deficit() > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_needed_count_starts_zero() {
        assert_eq!(pages_needed_count(), 0);
    }

    #[test]
    fn pagedaemon_wakeup_is_harmless_with_no_waiters() {
        pagedaemon_wakeup();
    }
}
