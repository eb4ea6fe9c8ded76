//! PerCpuCache - per-CPU lazy-free list in front of FreePool.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use spin::{Mutex, Once};

use crate::mach_vm::free_pool::{self, AllocClass};
use crate::kern::processor::NCPUS;

pub const PERCPU_MIN: usize = 128;
pub const PERCPU_TARGET: usize = 256;
pub const PERCPU_MAX: usize = 384;

struct PerCpuList {
    list: Mutex<VecDeque<u32>>,
}

static CACHES: Once<Vec<PerCpuList>> = Once::new();

pub fn init() {
    CACHES.call_once(|| {
        let mut v = Vec::with_capacity(NCPUS);
        for _ in 0..NCPUS {
            v.push(PerCpuList {
                list: Mutex::new(VecDeque::new()),
            });
        }
        v
    });
}

fn caches() -> &'static Vec<PerCpuList> {
    CACHES.get().expect("percpu_cache::init not called")
}

/// Best-effort current CPU index; falls back to 0 on architectures that
/// do not yet expose a cheap "which core am I on" primitive.
pub fn current_cpu_index() -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        use crate::arch::{Architecture, X86_64};
        X86_64::cpu_id() % NCPUS
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        0
    }
}

/// Pop one page from the calling CPU's cache, refilling from FreePool
/// first if the cache has fallen below `PERCPU_MIN`.
///
/// Colored (reservation-eligible) allocations bypass the cache entirely
/// so the (out-of-scope) reservation subsystem can see the request.
pub fn alloc(class: AllocClass, is_pagedaemon: bool, colored: bool) -> Option<u32> {
    if colored {
        return None;
    }
    let cache = &caches()[current_cpu_index()];
    let low = cache.list.lock().len() < PERCPU_MIN;
    if low {
        let batch = free_pool::free_pool().alloc_bulk(PERCPU_TARGET, class, is_pagedaemon);
        if !batch.is_empty() {
            cache.list.lock().extend(batch);
        }
    }
    cache.list.lock().pop_front()
}

/// Push a page back to the calling CPU's cache, draining to FreePool in
/// one batch if the cache has grown past `PERCPU_MAX`.
pub fn free(page_num: u32) {
    let cache = &caches()[current_cpu_index()];
    let drained = {
        let mut guard = cache.list.lock();
        guard.push_back(page_num);
        if guard.len() > PERCPU_MAX {
            let drain_n = guard.len() - PERCPU_TARGET;
            let mut out = Vec::with_capacity(drain_n);
            for _ in 0..drain_n {
                if let Some(p) = guard.pop_front() {
                    out.push(p);
                }
            }
            out
        } else {
            Vec::new()
        }
    };
    if !drained.is_empty() {
        let zero_flags = core::iter::repeat(false).take(drained.len());
        free_pool::free_pool().free_bulk(drained, zero_flags);
    }
}

/// Total pages currently cached across every CPU (diagnostic / testing).
pub fn total_cached() -> usize {
    caches().iter().map(|c| c.list.lock().len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> spin::MutexGuard<'static, ()> {
        let guard = free_pool::GLOBAL_TEST_LOCK.lock();
        free_pool::init(0, 0);
        free_pool::free_pool().seed(900_000..902_000u32, 0);
        init();
        guard
    }

    #[test]
    fn refill_and_drain_round_trip() {
        let _guard = setup();
        let before = free_pool::free_pool().free_count() as usize + total_cached();
        let mut got = Vec::new();
        for _ in 0..300 {
            if let Some(p) = alloc(AllocClass::Normal, false, false) {
                got.push(p);
            }
        }
        assert_eq!(got.len(), 300);
        for p in got {
            free(p);
        }
        let after = free_pool::free_pool().free_count() as usize + total_cached();
        assert_eq!(before, after);
    }

    #[test]
    fn colored_bypasses_cache() {
        let _guard = setup();
        assert!(alloc(AllocClass::Normal, false, true).is_none());
    }
}
