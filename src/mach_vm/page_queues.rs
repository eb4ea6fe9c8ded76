//! PageQueues - ACTIVE/INACTIVE placement, with address-lock-sharded
//! deferred INACTIVE insertion.
//!
//! The master INACTIVE list is protected by its own mutex, but enqueuing
//! a page onto it from the hot fault/pageout path would require acquiring
//! that single lock on every call. Instead a page being deactivated is
//! pushed onto the deferred shard living in its own address-lock bucket
//! (addr_lock::BucketState), which it is very likely to already hold.
//! `fixup` periodically splices every shard into the master list.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use spin::Mutex;

use crate::mach_vm::addr_lock::{self, PA_LOCK_COUNT};
use crate::mach_vm::vm_page::{pages, PageQueueType, QueueFlags};

/// Head/tail of an intrusive doubly-linked list threaded through each
/// page's own `queue_prev`/`queue_next`. Every operation here is O(1):
/// no traversal, since removal always starts from a page the caller
/// already knows is a member (its `queue_prev`/`queue_next` encode its
/// neighbors directly).
struct ListState {
    head: Option<u32>,
    tail: Option<u32>,
}

impl ListState {
    const fn new() -> Self {
        Self { head: None, tail: None }
    }

    fn push_back(&mut self, page_num: u32) {
        let page = pages::get(page_num);
        *page.queue_prev.lock() = self.tail;
        *page.queue_next.lock() = None;
        match self.tail {
            Some(prev) => *pages::get(prev).queue_next.lock() = Some(page_num),
            None => self.head = Some(page_num),
        }
        self.tail = Some(page_num);
    }

    fn pop_front(&mut self) -> Option<u32> {
        let page_num = self.head?;
        self.remove(page_num);
        Some(page_num)
    }

    /// Unlink `page_num`, which the caller guarantees is currently a
    /// member of this list (checked via `VmPage::queue`, not re-derived
    /// here).
    fn remove(&mut self, page_num: u32) {
        let page = pages::get(page_num);
        let prev = page.queue_prev.lock().take();
        let next = page.queue_next.lock().take();
        match prev {
            Some(p) => *pages::get(p).queue_next.lock() = next,
            None => self.head = next,
        }
        match next {
            Some(n) => *pages::get(n).queue_prev.lock() = prev,
            None => self.tail = prev,
        }
    }
}

struct MasterQueue {
    state: Mutex<ListState>,
    count: AtomicU32,
}

impl MasterQueue {
    const fn new() -> Self {
        Self {
            state: Mutex::new(ListState::new()),
            count: AtomicU32::new(0),
        }
    }
}

static ACTIVE: MasterQueue = MasterQueue::new();
static INACTIVE: MasterQueue = MasterQueue::new();

/// Deferred pages waiting in shards, not yet folded into `INACTIVE`.
static DEFERRED_COUNT: AtomicUsize = AtomicUsize::new(0);

/// `paqlenthresh`: once a single shard holds more than this many pages, a
/// fixup becomes worth running proactively.
static PAQLENTHRESH: AtomicUsize = AtomicUsize::new(4);
/// Total deferred pages across all shards above which the pageout daemon
/// is poked to run a forced fixup.
static MAX_DEFERRED: AtomicUsize = AtomicUsize::new(256);

/// Size the per-shard and total deferred thresholds from the total
/// physical page count, per the small/medium/large table.
pub fn configure_thresholds(total_pages: usize) {
    let (paqlen, max_deferred) = if total_pages < (1 << 18) {
        (4, 256)
    } else if total_pages < (1 << 21) {
        (16, 1024)
    } else {
        (64, 4096)
    };
    PAQLENTHRESH.store(paqlen, Ordering::Relaxed);
    MAX_DEFERRED.store(max_deferred, Ordering::Relaxed);
}

pub fn init(total_pages: usize) {
    configure_thresholds(total_pages);
}

pub fn active_count() -> u32 {
    ACTIVE.count.load(Ordering::SeqCst)
}
pub fn inactive_count() -> u32 {
    INACTIVE.count.load(Ordering::SeqCst) + DEFERRED_COUNT.load(Ordering::SeqCst) as u32
}

/// Enqueue a page onto the tail of ACTIVE, bumping its LRU usage counter
/// to at least `ACT_INIT` per the spec's activation contract.
pub fn enqueue_active(page_num: u32) {
    let page = pages::get(page_num);
    {
        let mut q = page.queue.lock();
        *q = PageQueueType::Active;
    }
    if page.act_count.load(Ordering::SeqCst) < crate::mach_vm::vm_page::ACT_INIT {
        page.act_count.store(crate::mach_vm::vm_page::ACT_INIT, Ordering::SeqCst);
    }
    ACTIVE.state.lock().push_back(page_num);
    ACTIVE.count.fetch_add(1, Ordering::SeqCst);
}

/// Enqueue a page onto its address-lock bucket's deferred INACTIVE shard.
/// Caller must already hold that page's address lock (the bucket mutex).
pub fn enqueue_inactive_deferred(page_num: u32, bucket: &mut addr_lock::BucketState) {
    let page = pages::get(page_num);
    *page.queue.lock() = PageQueueType::Inactive;
    page.set_queue_flags(QueueFlags::ON_DEFERRED_INACTIVE);
    bucket.deferred_inactive.push_back(page_num);
    DEFERRED_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Convenience wrapper that locks the page's own bucket.
pub fn enqueue_inactive(page_num: u32) {
    let phys = pages::get(page_num).phys_addr;
    let mut bucket = addr_lock::lock(phys);
    enqueue_inactive_deferred(page_num, &mut bucket);
    maybe_wake_fixup(&bucket);
}

fn maybe_wake_fixup(bucket: &addr_lock::BucketState) {
    let paqlen = PAQLENTHRESH.load(Ordering::Relaxed);
    let max_deferred = MAX_DEFERRED.load(Ordering::Relaxed);
    if bucket.deferred_inactive.len() > paqlen || DEFERRED_COUNT.load(Ordering::SeqCst) > max_deferred {
        crate::mach_vm::paging_control::pagedaemon_wakeup();
    }
}

/// Remove `page_num` from whichever queue it is on (master or deferred),
/// based on `ON_DEFERRED_INACTIVE`. Returns true if it was found.
///
/// The master-list branches trust `VmPage::queue` as ground truth for
/// membership (exactly as the deferred-shard branch already trusted
/// `ON_DEFERRED_INACTIVE`) and unlink in O(1) via the page's own
/// `queue_prev`/`queue_next`, rather than scanning the list to confirm
/// membership first.
pub fn dequeue(page_num: u32) -> bool {
    let page = pages::get(page_num);
    let q = *page.queue.lock();
    match q {
        PageQueueType::None => false,
        PageQueueType::Active => {
            ACTIVE.state.lock().remove(page_num);
            ACTIVE.count.fetch_sub(1, Ordering::SeqCst);
            *page.queue.lock() = PageQueueType::None;
            true
        }
        PageQueueType::Inactive => {
            if page.queue_flags().contains(QueueFlags::ON_DEFERRED_INACTIVE) {
                let mut bucket = addr_lock::lock(page.phys_addr);
                if let Some(pos) = bucket.deferred_inactive.iter().position(|&p| p == page_num) {
                    bucket.deferred_inactive.remove(pos);
                    drop(bucket);
                    DEFERRED_COUNT.fetch_sub(1, Ordering::SeqCst);
                    page.clear_queue_flags(QueueFlags::ON_DEFERRED_INACTIVE);
                    *page.queue.lock() = PageQueueType::None;
                    true
                } else {
                    false
                }
            } else {
                INACTIVE.state.lock().remove(page_num);
                INACTIVE.count.fetch_sub(1, Ordering::SeqCst);
                *page.queue.lock() = PageQueueType::None;
                true
            }
        }
    }
}

/// Pop a page from the head of the master ACTIVE list, for scan.
pub fn dequeue_active_head() -> Option<u32> {
    let page_num = ACTIVE.state.lock().pop_front()?;
    ACTIVE.count.fetch_sub(1, Ordering::SeqCst);
    *pages::get(page_num).queue.lock() = PageQueueType::None;
    Some(page_num)
}

/// Pop a page from the head of the master INACTIVE list, for scan. Does
/// not look at deferred shards; callers that need to drain those first
/// should call `fixup`.
pub fn dequeue_inactive_head() -> Option<u32> {
    let page_num = INACTIVE.state.lock().pop_front()?;
    INACTIVE.count.fetch_sub(1, Ordering::SeqCst);
    *pages::get(page_num).queue.lock() = PageQueueType::None;
    Some(page_num)
}

/// Move a page to the tail of ACTIVE, refreshing LRU order.
pub fn requeue_active(page_num: u32) {
    if dequeue(page_num) {
        enqueue_active(page_num);
    }
}

/// Fold every address-lock bucket's deferred-INACTIVE shard into the
/// master INACTIVE list. Must be called with no lock held by the caller
/// other than, transiently, the master INACTIVE lock acquired here
/// first, then each bucket in turn (lock ordering: master queue lock
/// before per-bucket page lock is the one sanctioned exception to "page
/// lock before queue lock", since page lock is rank 2 and queue lock is
/// rank 3 only in the allocation direction; fixup walks it the other
/// way deliberately and uses trylock to avoid a real inversion).
///
/// When `force` is false, a bucket whose trylock fails is simply skipped
/// this round (it will be picked up next time). When `force` is true,
/// every bucket is blocking-locked, guaranteeing full convergence; this
/// is used when `max_deferred` has been exceeded and the pageout daemon
/// needs a complete, not best-effort, view of INACTIVE.
pub fn fixup(force: bool) {
    let mut master = INACTIVE.state.lock();
    let mut moved: u32 = 0;
    for idx in 0..PA_LOCK_COUNT {
        let mut bucket = if force {
            Some(addr_lock::lock_index(idx))
        } else {
            addr_lock::try_lock_index(idx)
        };
        let Some(bucket) = bucket.as_mut() else {
            continue;
        };
        while let Some(page_num) = bucket.deferred_inactive.pop_front() {
            let page = pages::get(page_num);
            page.clear_queue_flags(QueueFlags::ON_DEFERRED_INACTIVE);
            master.push_back(page_num);
            moved += 1;
        }
    }
    drop(master);
    if moved > 0 {
        INACTIVE.count.fetch_add(moved, Ordering::SeqCst);
        DEFERRED_COUNT.fetch_sub(moved as usize, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ACTIVE/INACTIVE are plain statics, and page_lifecycle's tests reach
    // them too (via wire/unwire/activate/deactivate), so this file serializes
    // on the same crate-wide lock free_pool/percpu_cache tests use rather
    // than a file-local one; two different locks guarding the same counters
    // would let this file's and page_lifecycle's tests race on them.
    fn setup(last_page: u32) -> spin::MutexGuard<'static, ()> {
        let guard = crate::mach_vm::free_pool::GLOBAL_TEST_LOCK.lock();
        pages::init_for_test(last_page);
        addr_lock::init();
        configure_thresholds(1000);
        guard
    }

    #[test]
    fn enqueue_active_sets_act_count() {
        let _guard = setup(2010);
        let before = active_count();
        enqueue_active(2000);
        assert_eq!(pages::get(2000).act_count.load(Ordering::SeqCst), crate::mach_vm::vm_page::ACT_INIT);
        assert_eq!(active_count(), before + 1);
        assert!(dequeue(2000));
    }

    #[test]
    fn deferred_inactive_fixup_merges_into_master() {
        let _guard = setup(9000);
        let before = active_count() + inactive_count();
        for i in 3000..8000u32 {
            enqueue_inactive(i);
        }
        assert_eq!(active_count() + inactive_count(), before + 5000);
        fixup(true);
        assert_eq!(active_count() + inactive_count(), before + 5000);
        for idx in 0..PA_LOCK_COUNT {
            assert!(addr_lock::lock_index(idx).deferred_inactive.is_empty());
        }
    }

    #[test]
    fn dequeue_removes_from_deferred_shard() {
        let _guard = setup(2110);
        let before = inactive_count();
        enqueue_inactive(2102);
        assert!(dequeue(2102));
        assert_eq!(inactive_count(), before);
    }

    #[test]
    fn requeue_active_moves_to_tail() {
        let _guard = setup(2210);
        enqueue_active(2200);
        enqueue_active(2201);
        requeue_active(2200);
        assert_eq!(dequeue_active_head(), Some(2201));
        assert_eq!(dequeue_active_head(), Some(2200));
    }

    #[test]
    fn dequeue_unlinks_a_middle_member_without_disturbing_the_ends() {
        let _guard = setup(2310);
        enqueue_active(2300);
        enqueue_active(2301);
        enqueue_active(2302);
        assert!(dequeue(2301));
        assert_eq!(dequeue_active_head(), Some(2300));
        assert_eq!(dequeue_active_head(), Some(2302));
    }
}
