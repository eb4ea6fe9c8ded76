//! PageLifecycle - the orchestrator tying FreePool, PerCpuCache,
//! PageQueues, ObjectIndex (via `VmObject`) and PagingControl together
//! into the per-page state machine: FREE -> ALLOCATED -> ACTIVE/INACTIVE
//! -> FREE, with FICTITIOUS and UNHOLDFREE side paths.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::mach_vm::addr_lock;
use crate::mach_vm::free_pool::{self, AllocClass};
use crate::mach_vm::page_queues;
use crate::mach_vm::paging_control;
use crate::mach_vm::percpu_cache;
use crate::mach_vm::vm_object::VmObjectId;
use crate::mach_vm::vm_page::{pages, PageFlags, PageManager, PageQueueType, PageStats};

/// Reserve kept back for `AllocClass::Normal` requests.
pub const RESERVED_PAGES: u32 = 0;
/// Reserve kept back for `AllocClass::System` (the pagedaemon's own
/// escalation of a Normal request).
pub const INTERRUPT_FREE_MIN: u32 = 32;

/// Count of pages currently wired, summed across every object. Tracked
/// separately from `wire_count` on individual pages so diagnostics can
/// report system-wide pressure without walking every page.
static GLOBAL_WIRE_COUNT: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocFlags {
    /// Never park; return `None` instead of calling `vm_wait`.
    NoWait,
    /// Block in `vm_wait` until a page becomes available.
    Wait,
}

/// Busy state to apply to a page returned by `alloc`, matching the busy
/// state `grab` and friends otherwise had to apply themselves afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyMode {
    NotBusy,
    Exclusive,
    Shared,
}

/// Allocate a fresh page and associate it with `(object, offset)`. The
/// returned page starts in the ALLOCATED state: not on any queue, not
/// wired, valid/dirty bitmaps clear, busied per `busy`. `prefer_zero`
/// asks the pool for an already-zeroed page; `PageFlags::ZERO` on the
/// returned page reports whether one was actually available, not merely
/// whether it was requested. `mem_attr` is inherited from the owning
/// object unless the page is fictitious. Returns `None` if `object`
/// does not exist, if the pool is exhausted, or if `offset` is already
/// occupied in the object (in which case the page is unwired, its object
/// pointer cleared, and it is returned to the pool before `None` comes
/// back).
pub fn alloc(
    object: VmObjectId,
    offset: u64,
    class: AllocClass,
    is_pagedaemon: bool,
    busy: BusyMode,
    prefer_zero: bool,
) -> Option<u32> {
    let obj = crate::mach_vm::vm_object::lookup(object)?;
    let (page_num, is_zero) = alloc_raw(class, is_pagedaemon, prefer_zero, obj.is_colored())?;
    let page = pages::get(page_num);
    page.reset_valid_dirty();
    if is_zero {
        page.set_flags(PageFlags::ZERO);
    } else {
        page.clear_flags(PageFlags::ZERO);
    }

    if associate(page_num, &obj, offset).is_err() {
        free(page_num);
        return None;
    }

    if !page.is_fictitious() {
        page.set_mem_attr_field(obj.mem_attr());
    }

    match busy {
        BusyMode::NotBusy => {}
        BusyMode::Exclusive => {
            let acquired = page.xbusy();
            debug_assert!(acquired, "freshly allocated page must not already be busy");
        }
        BusyMode::Shared => {
            let acquired = page.sbusy();
            debug_assert!(acquired, "freshly allocated page must not already be busy");
        }
    }

    Some(page_num)
}

/// Allocate without object association (kernel-owned pages, bootstrap
/// use). `alloc_contig`/`alloc_freelist` both reduce to `alloc` since the
/// physical range allocator and freelist-selection policy are external
/// collaborators this crate does not implement; the simplification is
/// that every page comes from one undifferentiated free list rather than
/// per-freelist or per-NUMA-domain pools. Colored allocations and
/// zero-preferring allocations both bypass PerCpuCache: the cache has no
/// per-page colour or zero tracking, so only FreePool can honor either.
fn alloc_raw(class: AllocClass, is_pagedaemon: bool, prefer_zero: bool, colored: bool) -> Option<(u32, bool)> {
    if !prefer_zero {
        if let Some(page_num) = percpu_cache::alloc(class, is_pagedaemon, colored) {
            return Some((page_num, false));
        }
    }
    free_pool::free_pool().alloc_pages(class, is_pagedaemon, prefer_zero)
}

/// Allocate `count` physically-contiguous pages. The underlying
/// allocator hook (`alloc_contig`) is an out-of-scope external
/// collaborator; this falls back to independent single-page allocations,
/// which is only safe for callers that do not actually require
/// contiguity (documented as an Open Question resolution).
pub fn alloc_contig(
    object: VmObjectId,
    base_offset: u64,
    count: usize,
    class: AllocClass,
) -> Option<alloc::vec::Vec<u32>> {
    let mut out = alloc::vec::Vec::with_capacity(count);
    for i in 0..count {
        match alloc(
            object,
            base_offset + (i as u64) * crate::mach_vm::vm_page::PAGE_SIZE as u64,
            class,
            false,
            BusyMode::NotBusy,
            false,
        ) {
            Some(p) => out.push(p),
            None => {
                for &p in &out {
                    free(p);
                }
                return None;
            }
        }
    }
    Some(out)
}

/// Allocate from a specific conceptual freelist. Freelist partitioning
/// (DMA32 vs default, etc.) is out of scope; this is a thin alias over
/// `alloc` kept for call-site clarity.
pub fn alloc_freelist(object: VmObjectId, offset: u64, _freelist: u32, class: AllocClass) -> Option<u32> {
    alloc(object, offset, class, false, BusyMode::NotBusy, false)
}

/// Insert `page_num` into `obj`'s resident index at `offset`, then record
/// the association on the page itself. Order matters: the page is only
/// marked as belonging to `obj` once the index insert has actually
/// succeeded, so a collision leaves the page untouched for the caller to
/// unwind.
fn associate(page_num: u32, obj: &crate::mach_vm::vm_object::VmObject, offset: u64) -> Result<(), ()> {
    obj.page_insert(offset, page_num)?;
    pages::get(page_num).set_object_raw(Some(obj.id), offset);
    Ok(())
}

/// Replace the page occupying `offset` with `new_page_num`, leaving list
/// position and resident count untouched. The outgoing page must not be
/// queued; returns it to the caller rather than freeing it.
pub fn replace(object: VmObjectId, offset: u64, new_page_num: u32) -> Option<u32> {
    let obj = crate::mach_vm::vm_object::lookup(object)?;
    let old = obj.page_replace(offset, new_page_num)?;
    debug_assert!(
        *pages::get(old).queue.lock() == PageQueueType::None,
        "page replaced while still on a queue"
    );
    pages::get(new_page_num).set_object_raw(Some(object), offset);
    pages::get(old).set_object_raw(None, 0);
    Some(old)
}

/// Move the resident page at `old_offset` to `new_offset` within the
/// same object. Unconditionally dirties and deactivates the page, per
/// contract (a rename always invalidates whatever cached assumption a
/// reader had about its placement).
pub fn rename(object: VmObjectId, old_offset: u64, new_offset: u64) -> Option<u32> {
    let obj = crate::mach_vm::vm_object::lookup(object)?;
    let page_num = obj.page_rename(old_offset, new_offset)?;
    let page = pages::get(page_num);
    page.offset.store(new_offset, Ordering::SeqCst);
    if page.is_fully_valid() {
        page.dirty_kbi();
    }
    deactivate(page_num);
    Some(page_num)
}

/// Release `page_num` back to the pool. Panics on a wired or busy page
/// (contract violation, not a runtime condition this crate tolerates).
/// A page with `UNHOLDFREE` set and a nonzero `hold_count` is not
/// actually freed yet; the hold path frees it once the count drops to 0.
pub fn free(page_num: u32) {
    let page = pages::get(page_num);
    assert!(!page.is_wired(), "free of a wired page");
    assert!(!page.is_busy(), "free of a busy page");

    if page.is_fictitious() {
        // Fictitious pages are never pooled; the device-memory owner
        // manages their lifetime directly.
        return;
    }

    if page.has_flags(PageFlags::UNHOLDFREE) && page.hold_count() > 0 {
        return;
    }

    page_queues::dequeue(page_num);
    let mut colored = false;
    if let Some(object) = page.get_object() {
        let offset = page.offset.load(Ordering::SeqCst);
        if let Some(obj) = crate::mach_vm::vm_object::lookup(object) {
            obj.page_remove(offset);
            colored = obj.is_colored();
        }
    }
    page.set_object_raw(None, 0);
    let is_zero = page.has_flags(PageFlags::ZERO);
    page.reset_valid_dirty();
    page.clear_flags(PageFlags::UNHOLDFREE);
    page.clear_atomic_flags(crate::mach_vm::vm_page::AtomicFlags::REFERENCED);
    page.set_mem_attr_field(crate::mach_vm::vm_page::MemAttr::Default);
    page.act_count.store(0, Ordering::SeqCst);

    // Colored objects are reserved for superpage placement; their pages
    // must never end up in a per-CPU cache that could hand them back
    // scattered, so they go straight to FreePool instead.
    if colored {
        free_pool::free_pool().free_pages(page_num, is_zero);
    } else {
        percpu_cache::free(page_num);
    }
    paging_control::wakeup_free_waiters();
}

/// 0 -> 1 wire transition: removes the page from whatever queue it was
/// on (wired pages are never queued) and bumps both the per-page and
/// global wire counters.
pub fn wire(page_num: u32) {
    let page = pages::get(page_num);
    let prev = page.wire_count.fetch_add(1, Ordering::SeqCst);
    if prev == 0 {
        page_queues::dequeue(page_num);
        GLOBAL_WIRE_COUNT.fetch_add(1, Ordering::SeqCst);
    }
    if page.is_fictitious() {
        debug_assert_eq!(page.wire_count.load(Ordering::SeqCst), 1, "fictitious page wire_count must stay 1");
    }
}

/// 1 -> 0 wire transition: re-enqueues onto `queue` (unless the page is
/// fictitious, which is never queued). Panics if already unwired.
pub fn unwire(page_num: u32, queue: PageQueueType) {
    let page = pages::get(page_num);
    let prev = page.wire_count.fetch_sub(1, Ordering::SeqCst);
    assert!(prev >= 1, "unwire of a page with wire_count == 0");
    if prev == 1 {
        GLOBAL_WIRE_COUNT.fetch_sub(1, Ordering::SeqCst);
        if !page.is_fictitious() {
            match queue {
                PageQueueType::Active => page_queues::enqueue_active(page_num),
                PageQueueType::Inactive => page_queues::enqueue_inactive(page_num),
                PageQueueType::None => {}
            }
        }
    }
}

pub fn global_wire_count() -> u32 {
    GLOBAL_WIRE_COUNT.load(Ordering::SeqCst)
}

pub fn hold(page_num: u32) {
    pages::get(page_num).hold_count.fetch_add(1, Ordering::SeqCst);
}

/// Drop one hold reference. If this is the last hold and the page was
/// marked `UNHOLDFREE` (a free was deferred because the page was held),
/// complete that deferred free now.
pub fn unhold(page_num: u32) {
    let page = pages::get(page_num);
    let prev = page.hold_count.fetch_sub(1, Ordering::SeqCst);
    assert!(prev >= 1, "unhold of a page with hold_count == 0");
    if prev == 1 && page.has_flags(PageFlags::UNHOLDFREE) {
        free(page_num);
    }
}

/// Batch unhold, coalescing the address-lock bucket taken per distinct
/// physical page into one lock acquisition per bucket rather than one
/// per page.
pub fn unhold_pages(page_nums: &[u32]) {
    let mut by_bucket: alloc::collections::BTreeMap<usize, alloc::vec::Vec<u32>> = alloc::collections::BTreeMap::new();
    for &p in page_nums {
        let phys = pages::get(p).phys_addr;
        by_bucket.entry(addr_lock::bucket_index(phys)).or_default().push(p);
    }
    for (bucket_idx, group) in by_bucket {
        let _bucket = addr_lock::lock_index(bucket_idx);
        for p in group {
            unhold(p);
        }
    }
}

/// Place the page on ACTIVE, initializing `act_count` if it had none.
pub fn activate(page_num: u32) {
    page_queues::dequeue(page_num);
    page_queues::enqueue_active(page_num);
}

/// Place the page on INACTIVE (deferred shard, tail).
pub fn deactivate(page_num: u32) {
    page_queues::dequeue(page_num);
    page_queues::enqueue_inactive(page_num);
}

/// Place the page on INACTIVE at the head of its deferred shard, used by
/// the `MADV_DONTNEED` weighting path below to reclaim sooner than a
/// plain tail deactivation would.
pub fn deactivate_athead(page_num: u32) {
    page_queues::dequeue(page_num);
    let page = pages::get(page_num);
    let mut bucket = addr_lock::lock(page.phys_addr);
    *page.queue.lock() = PageQueueType::Inactive;
    page.set_queue_flags(crate::mach_vm::vm_page::QueueFlags::ON_DEFERRED_INACTIVE);
    bucket.deferred_inactive.push_front(page_num);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    Normal,
    DontNeed,
    Free,
}

/// How many `DontNeed`/`Free` advisories have been processed; the low
/// bits of this counter decide placement so that repeated advisories
/// against hot pages don't all pay the same (expensive) head-of-queue
/// treatment.
static DNW_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Apply an madvise-style hint. `is_modified` comes from the hardware
/// mapping layer (`is_modified`) and decides whether the dirty bit gets
/// set before the page is reclaimed or deactivated.
pub fn advise(page_num: u32, advice: Advice, is_modified: bool) {
    let page = pages::get(page_num);
    page.clear_referenced();
    page.test_dirty(is_modified);

    match advice {
        Advice::Normal => {}
        Advice::Free => {
            if !page.is_dirty() && !page.is_wired() && !page.is_busy() {
                free(page_num);
            }
        }
        Advice::DontNeed => {
            let dnw = DNW_COUNTER.fetch_add(1, Ordering::Relaxed);
            if dnw & 0x0070 == 0 {
                deactivate_athead(page_num);
            } else if dnw & 0x01F0 == 0 {
                // Skip: leave the page wherever it already is this round.
            } else {
                deactivate(page_num);
            }
        }
    }
}

/// Locate the resident page at `(object, offset)`, or allocate one.
/// Retries across a busy page via `busy_sleep`; blocks in `vm_wait`
/// on exhaustion unless `flags` is `NoWait`.
pub fn grab(object: VmObjectId, offset: u64, class: AllocClass, flags: AllocFlags) -> Option<u32> {
    loop {
        if let Some(obj) = crate::mach_vm::vm_object::lookup(object) {
            if let Some(page_num) = obj.page_lookup(offset) {
                let page = pages::get(page_num);
                if page.xbusy() {
                    return Some(page_num);
                }
                let bucket = addr_lock::lock(page.phys_addr);
                page.busy_sleep(bucket);
                continue;
            }
        }

        match alloc(object, offset, class, false, BusyMode::Exclusive, false) {
            Some(page_num) => {
                return Some(page_num);
            }
            None => {
                if flags == AllocFlags::NoWait {
                    return None;
                }
                paging_control::vm_wait();
            }
        }
    }
}

// ============================================================================
// Legacy PageManager-facing helpers (vm_page.rs)
// ============================================================================

pub fn legacy_stats() -> PageStats {
    PageStats {
        total: pages::count() as u32,
        free: free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32,
        active: page_queues::active_count(),
        inactive: page_queues::inactive_count(),
        wired: global_wire_count(),
        reserved: RESERVED_PAGES,
    }
}

pub fn memory_low() -> bool {
    paging_control::is_memory_low()
}

pub fn dequeue_active_for_scan() -> Option<u32> {
    page_queues::dequeue_active_head()
}
pub fn dequeue_inactive_for_scan() -> Option<u32> {
    page_queues::dequeue_inactive_head()
}

/// Legacy single-page allocate with no object association, used by
/// `vm_page::alloc_page()`.
pub fn alloc_legacy() -> Option<u32> {
    alloc_raw(AllocClass::Normal, false, false, false).map(|(page_num, _zero)| page_num)
}

#[allow(dead_code)]
fn unused_page_manager_marker(_: &PageManager) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_page::pages;

    // `free_pool`/`percpu_cache` back onto process-wide `Once` singletons
    // shared by every test module in the crate, so tests here take the
    // shared lock and only ever assert deltas, never an assumed-empty
    // starting state.
    fn setup(last_page: u32) -> spin::MutexGuard<'static, ()> {
        let guard = free_pool::GLOBAL_TEST_LOCK.lock();
        pages::init_for_test(last_page);
        addr_lock::init();
        free_pool::init(RESERVED_PAGES, INTERRUPT_FREE_MIN);
        percpu_cache::init();
        guard
    }

    #[test]
    fn alloc_then_free_restores_free_count() {
        let _guard = setup(14300);
        free_pool::free_pool().seed(14200..14300u32, 0);
        let before = free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32;
        let (page_num, _) = alloc_raw(AllocClass::Normal, false, false, false).expect("pool seeded");
        free(page_num);
        let after = free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32;
        assert_eq!(before, after);
    }

    #[test]
    fn wire_then_unwire_reenqueues() {
        let _guard = setup(14400);
        let page_num = 14350;
        wire(page_num);
        assert_eq!(pages::get(page_num).wire_count.load(Ordering::SeqCst), 1);
        unwire(page_num, PageQueueType::Active);
        assert_eq!(pages::get(page_num).wire_count.load(Ordering::SeqCst), 0);
        assert!(page_queues::dequeue(page_num));
    }

    #[test]
    #[should_panic(expected = "free of a wired page")]
    fn free_of_wired_page_panics() {
        let _guard = setup(14500);
        let page_num = 14450;
        wire(page_num);
        free(page_num);
    }

    #[test]
    fn hold_on_free_defers_until_unhold() {
        let _guard = setup(14600);
        let page_num = 14551;
        let before = free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32;
        let page = pages::get(page_num);
        hold(page_num);
        page.set_flags(PageFlags::UNHOLDFREE);
        free(page_num);
        assert_eq!(
            free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32,
            before,
            "page must stay held back, not returned to the pool"
        );
        unhold(page_num);
        assert_eq!(
            free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32,
            before + 1
        );
    }

    #[test]
    fn replace_preserves_resident_count() {
        let _guard = setup(14700);
        crate::mach_vm::vm_object::init();
        let obj = crate::mach_vm::vm_object::allocate(65536);
        obj.page_insert(0, 14650).unwrap();
        obj.page_insert(4096, 14651).unwrap();
        let before = obj.resident_page_count();
        let old = replace(obj.id, 4096, 14652).expect("occupied offset");
        assert_eq!(old, 14651);
        assert_eq!(obj.resident_page_count(), before);
        assert_eq!(obj.page_lookup(4096), Some(14652));
    }

    #[test]
    fn rename_dirties_and_moves_object() {
        let _guard = setup(14800);
        crate::mach_vm::vm_object::init();
        let obj = crate::mach_vm::vm_object::allocate(65536);
        obj.page_insert(0, 14750).unwrap();
        let page = pages::get(14750);
        page.set_valid_range(0, crate::mach_vm::vm_page::PAGE_SIZE, |_, _| {});
        rename(obj.id, 0, 8192).expect("page was resident");
        assert_eq!(obj.page_lookup(0), None);
        assert_eq!(obj.page_lookup(8192), Some(14750));
        assert!(page.is_dirty());
    }

    #[test]
    fn alloc_applies_busy_mode_and_mem_attr() {
        let _guard = setup(14970);
        crate::mach_vm::vm_object::init();
        let obj = crate::mach_vm::vm_object::allocate(65536);
        obj.set_mem_attr(crate::mach_vm::vm_page::MemAttr::WriteCombining);
        free_pool::free_pool().seed(14960..14970u32, 0);
        let page_num = alloc(obj.id, 0, AllocClass::Normal, false, BusyMode::Exclusive, false)
            .expect("pool seeded");
        let page = pages::get(page_num);
        assert!(page.is_exclusive_busy());
        assert_eq!(page.mem_attr(), crate::mach_vm::vm_page::MemAttr::WriteCombining);
    }

    #[test]
    fn alloc_collision_unwinds_and_returns_none() {
        let _guard = setup(15010);
        crate::mach_vm::vm_object::init();
        let obj = crate::mach_vm::vm_object::allocate(65536);
        obj.page_insert(0, 14950).unwrap();
        free_pool::free_pool().seed(14990..15000u32, 0);
        let before = free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32;
        let result = alloc(obj.id, 0, AllocClass::Normal, false, BusyMode::NotBusy, false);
        assert!(result.is_none());
        assert_eq!(
            free_pool::free_pool().free_count() + percpu_cache::total_cached() as u32,
            before,
            "the freshly allocated page must be returned to the pool, not leaked"
        );
        assert_eq!(obj.page_lookup(0), Some(14950), "the colliding resident page must be untouched");
    }

    #[test]
    fn alloc_prefer_zero_reports_whether_it_actually_got_one() {
        let _guard = setup(15100);
        crate::mach_vm::vm_object::init();
        let obj = crate::mach_vm::vm_object::allocate(65536);
        free_pool::free_pool().free_pages(15050, true);
        let page_num = alloc(obj.id, 0, AllocClass::Normal, false, BusyMode::NotBusy, true)
            .expect("pool seeded");
        assert_eq!(page_num, 15050);
        assert!(pages::get(page_num).has_flags(PageFlags::ZERO));
    }

    #[test]
    fn free_routes_colored_object_pages_straight_to_free_pool() {
        let _guard = setup(15200);
        crate::mach_vm::vm_object::init();
        let obj = crate::mach_vm::vm_object::allocate(65536);
        obj.set_flags(crate::mach_vm::vm_object::ObjectFlags::COLORED);
        free_pool::free_pool().seed(15150..15160u32, 0);
        let page_num = alloc(obj.id, 0, AllocClass::Normal, false, BusyMode::NotBusy, false)
            .expect("pool seeded");
        let before_pool = free_pool::free_pool().free_count();
        free(page_num);
        assert_eq!(free_pool::free_pool().free_count(), before_pool + 1);
    }
}
