//! FreePool - the global free-frame reserve.
//!
//! Wraps a single free-page list under one mutex (`free_mtx` in the
//! upstream naming) that governs every transition of `free_count` and
//! `zero_count`. PerCpuCache sits in front of this and is the fast path
//! for almost all allocation and freeing; FreePool itself never blocks.

use alloc::collections::VecDeque;
use spin::{Mutex, Once};

/// Allocation class, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocClass {
    Normal,
    System,
    Interrupt,
}

struct Inner {
    /// `(page_num, is_zero)`. Tracking zero-ness per entry (rather than
    /// only the aggregate `zero_count`) is what lets `alloc_pages` honor
    /// `want_zero` by preferring an actually-zeroed page instead of just
    /// counting how many exist.
    list: VecDeque<(u32, bool)>,
    free_count: u32,
    zero_count: u32,
}

pub struct FreePool {
    inner: Mutex<Inner>,
    reserved: u32,
    interrupt_free_min: u32,
    deficit: core::sync::atomic::AtomicU32,
}

impl FreePool {
    fn new(reserved: u32, interrupt_free_min: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                list: VecDeque::new(),
                free_count: 0,
                zero_count: 0,
            }),
            reserved,
            interrupt_free_min,
            deficit: core::sync::atomic::AtomicU32::new(0),
        }
    }

    fn reserve_for(&self, class: AllocClass, is_pagedaemon: bool) -> u32 {
        let class = if is_pagedaemon && class == AllocClass::Normal {
            AllocClass::System
        } else {
            class
        };
        match class {
            AllocClass::Normal => self.reserved,
            AllocClass::System => self.interrupt_free_min,
            AllocClass::Interrupt => 0,
        }
    }

    /// Seed the pool at boot with already-constructed free pages. The
    /// first `zero_pages` of `pages` (in iteration order) are marked zero.
    pub fn seed(&self, pages: impl IntoIterator<Item = u32>, zero_pages: u32) {
        let mut inner = self.inner.lock();
        let mut marked = 0u32;
        for p in pages {
            let is_zero = marked < zero_pages;
            if is_zero {
                marked += 1;
            }
            inner.list.push_back((p, is_zero));
            inner.free_count += 1;
        }
        inner.zero_count += marked;
    }

    /// Allocate a single page, honoring the reserve policy for `class`.
    /// Never blocks; returns `None` on exhaustion and bumps the deficit.
    /// If `want_zero` is set and a zero-marked page exists anywhere in the
    /// list, that page is returned in preference to the head; the `bool`
    /// in the result reports whether the page actually came back zeroed.
    pub fn alloc_pages(&self, class: AllocClass, is_pagedaemon: bool, want_zero: bool) -> Option<(u32, bool)> {
        let min = self.reserve_for(class, is_pagedaemon);
        let mut inner = self.inner.lock();
        if inner.free_count == 0 || inner.free_count <= min {
            drop(inner);
            self.deficit.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
            return None;
        }
        let entry = if want_zero {
            match inner.list.iter().position(|&(_, z)| z) {
                Some(pos) => inner.list.remove(pos),
                None => inner.list.pop_front(),
            }
        } else {
            inner.list.pop_front()
        };
        let (page_num, is_zero) = entry?;
        inner.free_count -= 1;
        if is_zero {
            inner.zero_count = inner.zero_count.saturating_sub(1);
        }
        Some((page_num, is_zero))
    }

    /// Allocate up to `n` pages in a single critical section (used by
    /// PerCpuCache refill so that `free_mtx` is taken exactly once).
    /// PerCpuCache does not track per-page zero status, so zero-ness is
    /// dropped here; callers that need a zeroed page must go through
    /// `alloc_pages` directly (see `page_lifecycle::alloc`'s `prefer_zero`
    /// handling, which bypasses PerCpuCache for that reason).
    pub fn alloc_bulk(&self, n: usize, class: AllocClass, is_pagedaemon: bool) -> alloc::vec::Vec<u32> {
        let min = self.reserve_for(class, is_pagedaemon);
        let mut inner = self.inner.lock();
        let mut out = alloc::vec::Vec::with_capacity(n);
        while out.len() < n && inner.free_count > min {
            match inner.list.pop_front() {
                Some((p, is_zero)) => {
                    inner.free_count -= 1;
                    if is_zero {
                        inner.zero_count = inner.zero_count.saturating_sub(1);
                    }
                    out.push(p);
                }
                None => break,
            }
        }
        out
    }

    /// Return a single page to the pool.
    pub fn free_pages(&self, page_num: u32, is_zero: bool) {
        let mut inner = self.inner.lock();
        inner.list.push_back((page_num, is_zero));
        inner.free_count += 1;
        if is_zero {
            inner.zero_count += 1;
        }
    }

    /// Return a batch of pages in one critical section (used by
    /// PerCpuCache drain).
    pub fn free_bulk(&self, pages: impl IntoIterator<Item = u32>, zero_pages: impl IntoIterator<Item = bool>) {
        let mut inner = self.inner.lock();
        let mut zero_iter = zero_pages.into_iter();
        for p in pages {
            let is_zero = zero_iter.next().unwrap_or(false);
            inner.list.push_back((p, is_zero));
            inner.free_count += 1;
            if is_zero {
                inner.zero_count += 1;
            }
        }
    }

    /// Adjust `free_count` without moving any page (used when a page
    /// transitions state without passing through this pool's list, e.g.
    /// a wire 1->0 transition that re-enqueues directly onto a queue).
    pub fn freecnt_adj(&self, delta: i32) {
        let mut inner = self.inner.lock();
        if delta >= 0 {
            inner.free_count += delta as u32;
        } else {
            inner.free_count = inner.free_count.saturating_sub((-delta) as u32);
        }
    }

    pub fn free_count(&self) -> u32 {
        self.inner.lock().free_count
    }

    pub fn zero_count(&self) -> u32 {
        self.inner.lock().zero_count
    }

    pub fn deficit(&self) -> u32 {
        self.deficit.load(core::sync::atomic::Ordering::Relaxed)
    }

    pub fn bump_deficit(&self, n: u32) {
        self.deficit.fetch_add(n, core::sync::atomic::Ordering::Relaxed);
    }

    pub fn clear_deficit(&self) {
        self.deficit.store(0, core::sync::atomic::Ordering::Relaxed);
    }
}

static FREE_POOL: Once<FreePool> = Once::new();

pub fn init(reserved: u32, interrupt_free_min: u32) {
    FREE_POOL.call_once(|| FreePool::new(reserved, interrupt_free_min));
}

pub fn free_pool() -> &'static FreePool {
    FREE_POOL.get().expect("free_pool::init not called")
}

/// `free_pool::init`/`percpu_cache::init` are `Once`-guarded process-wide
/// singletons, so only the first call across the whole test binary has
/// any effect. Every test module that touches the real global pool
/// (rather than a local `FreePool` instance, as most tests here do)
/// takes this lock for the duration of the test and reasons only in
/// terms of deltas it caused, never in terms of an assumed-empty
/// starting state.
#[cfg(test)]
pub static GLOBAL_TEST_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(reserved: u32) -> FreePool {
        let pool = FreePool::new(reserved, 4);
        pool.seed(0..100u32, 0);
        pool
    }

    #[test]
    fn normal_class_respects_reserve() {
        let pool = fresh(10);
        pool.inner.lock().free_count = 10;
        assert!(pool.alloc_pages(AllocClass::Normal, false, false).is_none());
        assert_eq!(pool.deficit(), 1);
    }

    #[test]
    fn interrupt_class_drains_to_zero() {
        let pool = fresh(0);
        pool.inner.lock().free_count = 1;
        pool.inner.lock().list = VecDeque::from(alloc::vec![(7, false)]);
        assert!(pool.alloc_pages(AllocClass::Interrupt, false, false).is_some());
    }

    #[test]
    fn bulk_alloc_and_free_round_trip() {
        let pool = fresh(0);
        let got = pool.alloc_bulk(10, AllocClass::Normal, false);
        assert_eq!(got.len(), 10);
        assert_eq!(pool.free_count(), 90);
        pool.free_bulk(got, core::iter::repeat(false));
        assert_eq!(pool.free_count(), 100);
    }

    #[test]
    fn want_zero_prefers_a_zeroed_page_out_of_order() {
        let pool = FreePool::new(0, 0);
        pool.free_pages(1, false);
        pool.free_pages(2, false);
        pool.free_pages(3, true);
        let (page_num, is_zero) = pool.alloc_pages(AllocClass::Normal, false, true).unwrap();
        assert_eq!(page_num, 3);
        assert!(is_zero);
        assert_eq!(pool.zero_count(), 0);
    }

    #[test]
    fn want_zero_with_no_zeroed_page_falls_back_to_head() {
        let pool = fresh(0);
        let (page_num, is_zero) = pool.alloc_pages(AllocClass::Normal, false, true).unwrap();
        assert_eq!(page_num, 0);
        assert!(!is_zero);
    }
}
