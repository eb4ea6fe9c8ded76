//! Address-lock buckets - the "page lock" of the resident-memory manager.
//!
//! Every physical page hashes deterministically to one of `PA_LOCK_COUNT`
//! buckets. The bucket mutex serves two purposes at once: it is the page
//! lock referenced throughout vm_page.rs (guarding queue transitions and
//! hold_count), and it is the lock that guards that bucket's deferred
//! INACTIVE shard in page_queues.rs. Unifying the two matches the upstream
//! design: the deferred shard is enqueued "under only the page's own lock".

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard, Once};

/// Number of address-lock buckets. Chosen to match common kernel sizing;
/// must be a power of two for the mask-based hash below.
pub const PA_LOCK_COUNT: usize = 256;

/// State protected by one address-lock bucket.
pub struct BucketState {
    /// Deferred-INACTIVE shard for this bucket (see page_queues.rs).
    pub deferred_inactive: VecDeque<u32>,
}

impl BucketState {
    const fn new() -> Self {
        Self {
            deferred_inactive: VecDeque::new(),
        }
    }
}

struct Bucket {
    mtx: Mutex<BucketState>,
}

static BUCKETS: Once<Vec<Bucket>> = Once::new();

pub fn init() {
    BUCKETS.call_once(|| {
        let mut v = Vec::with_capacity(PA_LOCK_COUNT);
        for _ in 0..PA_LOCK_COUNT {
            v.push(Bucket {
                mtx: Mutex::new(BucketState::new()),
            });
        }
        v
    });
}

fn buckets() -> &'static Vec<Bucket> {
    BUCKETS.get().expect("addr_lock::init not called")
}

/// Hash a physical address to its bucket index.
pub fn bucket_index(phys_addr: u64) -> usize {
    let page_num = phys_addr >> crate::mach_vm::vm_page::PAGE_SHIFT;
    (page_num as usize) & (PA_LOCK_COUNT - 1)
}

/// Acquire the page lock for the page at `phys_addr`.
pub fn lock(phys_addr: u64) -> MutexGuard<'static, BucketState> {
    buckets()[bucket_index(phys_addr)].mtx.lock()
}

/// Non-blocking acquire, used by the fixup pass unless `force` is set.
pub fn try_lock(phys_addr: u64) -> Option<MutexGuard<'static, BucketState>> {
    buckets()[bucket_index(phys_addr)].mtx.try_lock()
}

/// Acquire bucket `index` directly (used by the fixup pass, which iterates
/// every bucket rather than hashing from a page).
pub fn lock_index(index: usize) -> MutexGuard<'static, BucketState> {
    buckets()[index].mtx.lock()
}

pub fn try_lock_index(index: usize) -> Option<MutexGuard<'static, BucketState>> {
    buckets()[index].mtx.try_lock()
}

pub fn count() -> usize {
    buckets().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_index_is_stable() {
        init();
        assert_eq!(bucket_index(0x1000), bucket_index(0x1000));
    }

    #[test]
    fn try_lock_fails_while_held() {
        init();
        let _guard = lock(0x2000);
        assert!(try_lock(0x2000).is_none());
    }
}
