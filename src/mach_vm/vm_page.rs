//! Page - the fundamental unit of the resident-memory manager.
//!
//! One instance per physical frame plus ephemeral FICTITIOUS frames used
//! to represent device memory. The struct and its busy protocol are the
//! load-bearing part of this module; PageLifecycle (page_lifecycle.rs)
//! is the orchestrator that ties Page together with FreePool, PerCpuCache
//! and PageQueues.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use spin::{Mutex, Once};

use crate::kern::sched_prim;
use crate::mach_vm::vm_object::VmObjectId;

// ============================================================================
// Constants
// ============================================================================

/// Page size (4KB on most platforms).
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE).
pub const PAGE_SHIFT: usize = 12;
/// Device block size underlying the valid/dirty bitmaps.
pub const DEV_BSIZE: usize = 512;
pub const DEV_BSHIFT: u32 = 9;
/// Number of DEV_BSIZE sub-blocks per page; also the number of bits used
/// in `valid`/`dirty`.
pub const BITS_PER_PAGE: u32 = (PAGE_SIZE / DEV_BSIZE) as u32;
/// All-bits-set mask for a fully valid/dirty page.
pub const VM_PAGE_BITS_ALL: u32 = if BITS_PER_PAGE >= 32 {
    u32::MAX
} else {
    (1u32 << BITS_PER_PAGE) - 1
};
/// Default initial LRU usage counter given to a newly activated page.
pub const ACT_INIT: u32 = 5;

/// Invalid physical address, used by fictitious pages.
pub const PHYS_ADDR_INVALID: u64 = u64::MAX;

// ============================================================================
// Sticky flags, atomic flags, object flags, queue flags
// ============================================================================

macro_rules! bitset {
    ($name:ident, $repr:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            pub const fn empty() -> Self {
                Self(0)
            }
            pub const fn bits(&self) -> $repr {
                self.0
            }
            pub const fn from_bits_truncate(bits: $repr) -> Self {
                Self(bits)
            }
            pub const fn contains(&self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

bitset!(PageFlags, u32, "Sticky page attributes.");
impl PageFlags {
    pub const ZERO: Self = Self(0x01);
    pub const FICTITIOUS: Self = Self(0x02);
    pub const UNHOLDFREE: Self = Self(0x04);
    pub const NODUMP: Self = Self(0x08);
    pub const WINATCFLS: Self = Self(0x10);
    /// Consumer-specific extension retained for the page-out daemon
    /// interface (see paging_control.rs); not one of the core's own
    /// invariants.
    pub const LAUNDRY: Self = Self(0x20);
}

bitset!(AtomicFlags, u32, "Flags mutated with atomic RMW, readable lock-free.");
impl AtomicFlags {
    pub const REFERENCED: Self = Self(0x01);
    pub const WRITEABLE: Self = Self(0x02);
}

bitset!(PageObjectFlags, u32, "Per-page flags governed by the owning object's lock.");
impl PageObjectFlags {
    pub const UNMANAGED: Self = Self(0x01);
    pub const NOSYNC: Self = Self(0x02);
}

bitset!(QueueFlags, u32, "Flags describing placement on a queue, among others ON_DEFERRED_INACTIVE.");
impl QueueFlags {
    pub const ON_DEFERRED_INACTIVE: Self = Self(0x01);
}

/// Cacheability attribute, reported and set through the hardware-mapping
/// hooks in pmap_hooks.rs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemAttr {
    Default = 0,
    Uncacheable = 1,
    WriteCombining = 2,
    WriteThrough = 3,
    WriteBack = 4,
}

impl MemAttr {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Uncacheable,
            2 => Self::WriteCombining,
            3 => Self::WriteThrough,
            4 => Self::WriteBack,
            _ => Self::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageQueueType {
    None = 0,
    Active = 1,
    Inactive = 2,
}

// ============================================================================
// BusyProtocol - the busy_lock word
// ============================================================================

const UNBUSIED: u32 = 0;
const SINGLE_EXCLUSIVE: u32 = 1 << 31;
const WAITERS: u32 = 1 << 30;
const SHARERS_MASK: u32 = WAITERS - 1;

// ============================================================================
// Page
// ============================================================================

/// A single physical frame (or a fictitious stand-in for one).
pub struct VmPage {
    pub phys_addr: u64,
    pub page_num: u32,

    pub object: Mutex<Option<VmObjectId>>,
    pub offset: AtomicU64,

    pub queue: Mutex<PageQueueType>,
    pub queue_flags: AtomicU32,

    busy_lock: AtomicU32,

    pub wire_count: AtomicU32,
    pub hold_count: AtomicU32,
    pub act_count: AtomicU32,

    valid: AtomicU32,
    dirty: AtomicU32,

    flags: AtomicU32,
    atomic_flags: AtomicU32,
    object_flags: AtomicU32,
    mem_attr: AtomicU8,

    /// Intrusive links for ObjectIndex's offset-ordered list. Mutated only
    /// while the owning object's write lock is held.
    pub list_prev: Mutex<Option<u32>>,
    pub list_next: Mutex<Option<u32>>,

    /// Intrusive links for PageQueues' master ACTIVE/INACTIVE lists,
    /// distinct from `list_prev`/`list_next` above since a page is a
    /// member of at most one object index and at most one page queue at
    /// a time, but the two memberships are independent. Mutated only
    /// while the relevant master queue lock is held.
    pub queue_prev: Mutex<Option<u32>>,
    pub queue_next: Mutex<Option<u32>>,
}

impl core::fmt::Debug for VmPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VmPage")
            .field("phys_addr", &self.phys_addr)
            .field("page_num", &self.page_num)
            .finish()
    }
}

impl VmPage {
    fn new(phys_addr: u64, page_num: u32) -> Self {
        Self {
            phys_addr,
            page_num,
            object: Mutex::new(None),
            offset: AtomicU64::new(0),
            queue: Mutex::new(PageQueueType::None),
            queue_flags: AtomicU32::new(0),
            busy_lock: AtomicU32::new(UNBUSIED),
            wire_count: AtomicU32::new(0),
            hold_count: AtomicU32::new(0),
            act_count: AtomicU32::new(0),
            valid: AtomicU32::new(0),
            dirty: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            atomic_flags: AtomicU32::new(0),
            object_flags: AtomicU32::new(0),
            mem_attr: AtomicU8::new(MemAttr::Default as u8),
            list_prev: Mutex::new(None),
            list_next: Mutex::new(None),
            queue_prev: Mutex::new(None),
            queue_next: Mutex::new(None),
        }
    }

    // -- sticky / atomic / object flags -------------------------------------

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }
    pub fn set_flags(&self, f: PageFlags) {
        self.flags.fetch_or(f.bits(), Ordering::SeqCst);
    }
    pub fn clear_flags(&self, f: PageFlags) {
        self.flags.fetch_and(!f.bits(), Ordering::SeqCst);
    }
    pub fn has_flags(&self, f: PageFlags) -> bool {
        self.flags().contains(f)
    }

    pub fn atomic_flags(&self) -> AtomicFlags {
        AtomicFlags::from_bits_truncate(self.atomic_flags.load(Ordering::SeqCst))
    }
    pub fn set_atomic_flags(&self, f: AtomicFlags) {
        self.atomic_flags.fetch_or(f.bits(), Ordering::SeqCst);
    }
    pub fn clear_atomic_flags(&self, f: AtomicFlags) {
        self.atomic_flags.fetch_and(!f.bits(), Ordering::SeqCst);
    }

    pub fn object_flags(&self) -> PageObjectFlags {
        PageObjectFlags::from_bits_truncate(self.object_flags.load(Ordering::SeqCst))
    }
    pub fn set_object_flags(&self, f: PageObjectFlags) {
        self.object_flags.fetch_or(f.bits(), Ordering::SeqCst);
    }
    pub fn clear_object_flags(&self, f: PageObjectFlags) {
        self.object_flags.fetch_and(!f.bits(), Ordering::SeqCst);
    }

    pub fn queue_flags(&self) -> QueueFlags {
        QueueFlags::from_bits_truncate(self.queue_flags.load(Ordering::SeqCst))
    }
    pub fn set_queue_flags(&self, f: QueueFlags) {
        self.queue_flags.fetch_or(f.bits(), Ordering::SeqCst);
    }
    pub fn clear_queue_flags(&self, f: QueueFlags) {
        self.queue_flags.fetch_and(!f.bits(), Ordering::SeqCst);
    }

    pub fn mem_attr(&self) -> MemAttr {
        MemAttr::from_u8(self.mem_attr.load(Ordering::SeqCst))
    }
    pub fn set_mem_attr_field(&self, attr: MemAttr) {
        self.mem_attr.store(attr as u8, Ordering::SeqCst);
    }

    pub fn is_fictitious(&self) -> bool {
        self.has_flags(PageFlags::FICTITIOUS)
    }

    // -- object association --------------------------------------------------

    pub fn get_object(&self) -> Option<VmObjectId> {
        *self.object.lock()
    }

    /// Raw association used by ObjectIndex-driven inserts; does not touch
    /// queue placement.
    pub(crate) fn set_object_raw(&self, object: Option<VmObjectId>, offset: u64) {
        *self.object.lock() = object;
        self.offset.store(offset, Ordering::SeqCst);
    }

    // -- wiring / holding ------------------------------------------------------

    pub fn is_wired(&self) -> bool {
        self.wire_count.load(Ordering::SeqCst) > 0
    }

    pub fn hold_count(&self) -> u32 {
        self.hold_count.load(Ordering::SeqCst)
    }

    // -- valid/dirty bitmap algebra (see §4.7) ----------------------------

    /// `(2 << last_bit) - (1 << first_bit)`, the inclusive bitmap for an
    /// arbitrary sub-range. `bits(base, 0) == 0`, `bits(0, PAGE_SIZE) ==
    /// VM_PAGE_BITS_ALL`.
    pub fn bits(base: usize, size: usize) -> u32 {
        if size == 0 {
            return 0;
        }
        let first_bit = (base % PAGE_SIZE) / DEV_BSIZE;
        let last_bit = (base % PAGE_SIZE + size - 1) / DEV_BSIZE;
        if last_bit as u32 >= 31 {
            return VM_PAGE_BITS_ALL & !((1u32 << first_bit) - 1);
        }
        (2u32 << last_bit) - (1u32 << first_bit)
    }

    pub fn valid(&self) -> u32 {
        self.valid.load(Ordering::SeqCst)
    }
    pub fn dirty(&self) -> u32 {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn is_valid(&self, base: usize, size: usize) -> bool {
        let mask = Self::bits(base, size);
        (self.valid() & mask) == mask
    }

    pub fn is_fully_valid(&self) -> bool {
        self.valid() == VM_PAGE_BITS_ALL
    }

    /// Zeroes the sub-DEV_BSIZE residue straddling `[base, base+size)`
    /// where the corresponding valid bit is clear, then sets the valid
    /// bits for the range. Caller holds the object lock.
    pub fn set_valid_range(&self, base: usize, size: usize, zero_residue: impl FnMut(usize, usize)) {
        self.zero_residue_if_invalid(base, size, zero_residue);
        let mask = Self::bits(base, size);
        debug_assert!(
            (!self.valid() & mask & self.dirty()) == 0,
            "set_valid_range: a newly-valid bit must not already be dirty"
        );
        self.valid.fetch_or(mask, Ordering::SeqCst);
    }

    fn zero_residue_if_invalid(&self, base: usize, size: usize, mut zero_residue: impl FnMut(usize, usize)) {
        let page_base = base - (base % PAGE_SIZE);
        let start_block = (base % PAGE_SIZE) / DEV_BSIZE * DEV_BSIZE;
        if base % DEV_BSIZE != 0 {
            let block_bit = Self::bits(page_base + start_block, 1);
            if self.valid() & block_bit == 0 {
                zero_residue(page_base + start_block, base - (page_base + start_block));
            }
        }
        let end = base + size;
        if end % DEV_BSIZE != 0 {
            let end_block = (end % PAGE_SIZE) / DEV_BSIZE * DEV_BSIZE;
            let block_bit = Self::bits(page_base + end_block, 1);
            if self.valid() & block_bit == 0 {
                let block_end = page_base + end_block + DEV_BSIZE;
                if block_end > end {
                    zero_residue(end, block_end - end);
                }
            }
        }
    }

    /// `set_valid_range` plus dirty-clearing. If the whole page becomes
    /// valid, the caller must invoke the hardware mapping's `clear_modify`
    /// before calling this (to avoid a race with a concurrent protect).
    pub fn set_validclean(&self, base: usize, size: usize, zero_residue: impl FnMut(usize, usize)) {
        self.set_valid_range(base, size, zero_residue);
        let mask = Self::bits(base, size);
        self.dirty.fetch_and(!mask, Ordering::SeqCst);
        self.clear_object_flags(PageObjectFlags::NOSYNC);
    }

    /// Clear dirty bits for `mask`. If the page is neither exclusively
    /// busy nor write-mapped, a plain store under the object lock
    /// suffices (the fast path below); otherwise the caller must use the
    /// slower atomic RMW paths selected by `PAGE_SIZE` in
    /// `clear_dirty_mask`.
    pub fn clear_dirty(&self, base: usize, size: usize) {
        let mask = Self::bits(base, size);
        self.dirty.fetch_and(!mask, Ordering::SeqCst);
    }

    /// Atomic clear-dirty-mask with the width chosen at compile time by
    /// `BITS_PER_PAGE`, exactly as the three separate code paths the
    /// upstream implementation keeps for 32-bit, 16-bit, and the 8-bit
    /// emulation via an aligned 32-bit clear (whose shift direction
    /// depends on byte order).
    pub fn clear_dirty_mask(&self, mask: u32) {
        if BITS_PER_PAGE > 16 {
            self.clear_dirty_mask_32(mask);
        } else if BITS_PER_PAGE > 8 {
            self.clear_dirty_mask_16(mask);
        } else {
            self.clear_dirty_mask_8(mask);
        }
    }

    fn clear_dirty_mask_32(&self, mask: u32) {
        self.dirty.fetch_and(!mask, Ordering::SeqCst);
    }

    fn clear_dirty_mask_16(&self, mask: u32) {
        // Two independent 16-bit halves cleared via a masked 32-bit RMW;
        // no cross-half carry is possible since each half's mask bits
        // stay within their half.
        self.dirty.fetch_and(!(mask & 0xFFFF), Ordering::SeqCst);
    }

    fn clear_dirty_mask_8(&self, mask: u32) {
        // BITS_PER_PAGE <= 8: the whole bitmap lives in one byte of a
        // 32-bit-aligned word. The byte position within that word depends
        // on endianness.
        #[cfg(target_endian = "little")]
        let shifted = mask & 0xFF;
        #[cfg(target_endian = "big")]
        let shifted = (mask & 0xFF) << 24;
        self.dirty.fetch_and(!shifted, Ordering::SeqCst);
    }

    /// Clears both valid and dirty for `[base, base+size)`. If `base==0`
    /// and the range reaches past `object_size` the whole page is
    /// invalidated and, if it was fully valid, `remove_all` is invoked by
    /// the caller (PageLifecycle) since that is a hardware-mapping hook.
    pub fn set_invalid(&self, base: usize, size: usize, object_size: Option<u64>) -> bool {
        let was_fully_valid = self.is_fully_valid();
        let whole_page = base == 0
            && object_size
                .map(|sz| (base as u64 + size as u64) >= sz)
                .unwrap_or(false);
        let mask = if whole_page {
            VM_PAGE_BITS_ALL
        } else {
            Self::bits(base, size)
        };
        self.valid.fetch_and(!mask, Ordering::SeqCst);
        self.dirty.fetch_and(!mask, Ordering::SeqCst);
        whole_page && was_fully_valid
    }

    /// Zero the sub-block gaps inside the page that are not yet valid,
    /// via `zero_fn(offset, len)`; optionally mark the whole page valid.
    pub fn zero_invalid(&self, setvalid: bool, mut zero_fn: impl FnMut(usize, usize)) {
        let mut bit = 0usize;
        while bit < BITS_PER_PAGE as usize {
            if self.valid() & (1 << bit) == 0 {
                zero_fn(bit * DEV_BSIZE, DEV_BSIZE);
            }
            bit += 1;
        }
        if setvalid {
            self.valid.store(VM_PAGE_BITS_ALL, Ordering::SeqCst);
        }
    }

    /// Sets `dirty = ALL`. Callable only on a fully-valid page.
    pub fn dirty_kbi(&self) {
        debug_assert!(self.is_fully_valid(), "dirty_KBI requires a fully valid page");
        self.dirty.store(VM_PAGE_BITS_ALL, Ordering::SeqCst);
    }

    /// If not already fully dirty and the hardware mapping reports the
    /// page modified, mark it dirty.
    pub fn test_dirty(&self, is_modified: bool) {
        if self.dirty() != VM_PAGE_BITS_ALL && is_modified {
            self.dirty.store(VM_PAGE_BITS_ALL, Ordering::SeqCst);
        }
    }

    pub fn reset_valid_dirty(&self) {
        self.valid.store(0, Ordering::SeqCst);
        self.dirty.store(0, Ordering::SeqCst);
    }

    // -- BusyProtocol ---------------------------------------------------------

    /// CAS UNBUSIED -> SINGLE_EXCLUSIVE.
    pub fn xbusy(&self) -> bool {
        self.busy_lock
            .compare_exchange(UNBUSIED, SINGLE_EXCLUSIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// CAS current shared count N -> N+1, retrying on benign races;
    /// fails immediately if currently exclusive.
    pub fn sbusy(&self) -> bool {
        loop {
            let cur = self.busy_lock.load(Ordering::Acquire);
            if cur & SINGLE_EXCLUSIVE != 0 {
                return false;
            }
            let sharers = cur & SHARERS_MASK;
            let new = (sharers + 1) | (cur & WAITERS);
            if self
                .busy_lock
                .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Single-shot, no-retry variant of `sbusy`.
    pub fn try_sbusy(&self) -> bool {
        let cur = self.busy_lock.load(Ordering::Acquire);
        if cur & SINGLE_EXCLUSIVE != 0 {
            return false;
        }
        let sharers = cur & SHARERS_MASK;
        let new = (sharers + 1) | (cur & WAITERS);
        self.busy_lock
            .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Decrement shared count; on last release, clear WAITERS and wake
    /// waiters on the page's wait channel.
    pub fn sunbusy(&self) {
        loop {
            let cur = self.busy_lock.load(Ordering::Acquire);
            let sharers = cur & SHARERS_MASK;
            debug_assert!(sharers >= 1, "sunbusy on an unshared page");
            let new = if sharers == 1 { 0 } else { (sharers - 1) | (cur & WAITERS) };
            if self
                .busy_lock
                .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if new == 0 && cur & WAITERS != 0 {
                    self.wake_busy_waiters();
                }
                return;
            }
        }
    }

    /// CAS SINGLE_EXCLUSIVE -> UNBUSIED, waking waiters on the slow path.
    pub fn xunbusy(&self) {
        loop {
            let cur = self.busy_lock.load(Ordering::Acquire);
            debug_assert!(cur & SINGLE_EXCLUSIVE != 0, "xunbusy on a non-exclusive page");
            if self
                .busy_lock
                .compare_exchange(cur, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if cur & WAITERS != 0 {
                    self.wake_busy_waiters();
                }
                return;
            }
        }
    }

    /// Atomically SINGLE_EXCLUSIVE -> N_SHARED(1), preserving WAITERS.
    pub fn downgrade(&self) {
        loop {
            let cur = self.busy_lock.load(Ordering::Acquire);
            debug_assert!(cur & SINGLE_EXCLUSIVE != 0, "downgrade on a non-exclusive page");
            let new = 1 | (cur & WAITERS);
            if self
                .busy_lock
                .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy_lock.load(Ordering::Acquire) != UNBUSIED
    }

    pub fn is_exclusive_busy(&self) -> bool {
        self.busy_lock.load(Ordering::Acquire) & SINGLE_EXCLUSIVE != 0
    }

    fn wake_busy_waiters(&self) {
        let event = sched_prim::event_from_addr(self);
        sched_prim::thread_wakeup_prim(event, false);
    }

    /// Caller holds the page (address-lock bucket) lock. Sets WAITERS,
    /// releases the page lock by dropping `page_lock_guard`, and parks on
    /// the page as wait channel. On wake, the caller must re-acquire the
    /// page lock and retry whatever busy operation it wanted.
    pub fn busy_sleep<T>(&self, page_lock_guard: T) {
        loop {
            let cur = self.busy_lock.load(Ordering::Acquire);
            if cur == UNBUSIED {
                drop(page_lock_guard);
                return;
            }
            let new = cur | WAITERS;
            if self
                .busy_lock
                .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        drop(page_lock_guard);
        let event = sched_prim::event_from_addr(self);
        sched_prim::thread_sleep(event, true);
    }

    // -- legacy compatibility surface (vm_fault / vm_kern / vm_pageout) ------

    pub fn is_referenced(&self) -> bool {
        self.atomic_flags().contains(AtomicFlags::REFERENCED)
    }
    pub fn clear_referenced(&self) {
        self.clear_atomic_flags(AtomicFlags::REFERENCED);
    }
    pub fn set_referenced(&self) {
        self.set_atomic_flags(AtomicFlags::REFERENCED);
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty() != 0
    }
}

// ============================================================================
// Global page table
// ============================================================================

pub mod pages {
    use super::*;

    static TABLE: Once<Vec<VmPage>> = Once::new();

    pub fn init_with_memory(start_addr: u64, end_addr: u64) {
        TABLE.call_once(|| {
            let start_page = start_addr >> PAGE_SHIFT;
            let end_page = end_addr >> PAGE_SHIFT;
            let count = (end_page - start_page) as usize;
            let mut v = Vec::with_capacity(count);
            for i in 0..count {
                let page_num = start_page as u32 + i as u32;
                v.push(VmPage::new((page_num as u64) << PAGE_SHIFT, page_num));
            }
            v
        });
    }

    /// Every test module in this crate shares one process-wide page
    /// table (it is a plain `static`), so `init_for_test` always builds
    /// the same generously-sized table regardless of which test happens
    /// to initialize it first; `count` only asserts that table is big
    /// enough for the caller's needs.
    #[cfg(test)]
    const TEST_TABLE_SIZE: u32 = 16384;

    #[cfg(test)]
    pub fn init_for_test(count: u32) {
        assert!(count <= TEST_TABLE_SIZE, "grow TEST_TABLE_SIZE");
        TABLE.call_once(|| {
            let mut v = Vec::with_capacity(TEST_TABLE_SIZE as usize);
            for page_num in 0..TEST_TABLE_SIZE {
                v.push(VmPage::new((page_num as u64) << PAGE_SHIFT, page_num));
            }
            v
        });
    }

    pub fn try_table() -> Option<&'static Vec<VmPage>> {
        TABLE.get()
    }

    pub fn get(page_num: u32) -> &'static VmPage {
        &TABLE.get().expect("page table not initialized")[page_num as usize]
    }

    pub fn count() -> usize {
        TABLE.get().map(Vec::len).unwrap_or(0)
    }
}

// ============================================================================
// Address/page conversions
// ============================================================================

pub const fn addr_to_page(addr: u64) -> u32 {
    (addr >> PAGE_SHIFT) as u32
}
pub const fn page_to_addr(page: u32) -> u64 {
    (page as u64) << PAGE_SHIFT
}
pub const fn trunc_page(addr: u64) -> u64 {
    addr & !(PAGE_SIZE as u64 - 1)
}
pub const fn round_page(addr: u64) -> u64 {
    (addr + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1)
}

// ============================================================================
// Legacy PageManager facade
// ============================================================================
//
// vm_fault.rs / vm_kern.rs / vm_pageout.rs address pages through this
// simpler, pre-existing surface. It now delegates to PageLifecycle /
// FreePool / PageQueues rather than owning its own free/active/inactive
// lists.

use crate::mach_vm::page_lifecycle;

#[derive(Debug, Clone, Copy, Default)]
pub struct PageStats {
    pub total: u32,
    pub free: u32,
    pub active: u32,
    pub inactive: u32,
    pub wired: u32,
    pub reserved: u32,
}

pub struct PageManager;

impl PageManager {
    pub fn get_page(&self, page_num: u32) -> Option<&'static VmPage> {
        pages::try_table().and_then(|t| t.get(page_num as usize))
    }

    pub fn stats(&self) -> PageStats {
        page_lifecycle::legacy_stats()
    }

    pub fn activate(&mut self, page_num: u32) {
        page_lifecycle::activate(page_num);
    }
    pub fn deactivate(&mut self, page_num: u32) {
        page_lifecycle::deactivate(page_num);
    }
    pub fn free(&mut self, page_num: u32) {
        page_lifecycle::free(page_num);
    }
    pub fn dequeue_active(&mut self) -> Option<u32> {
        page_lifecycle::dequeue_active_for_scan()
    }
    pub fn enqueue_active(&mut self, page_num: u32) {
        page_lifecycle::activate(page_num);
    }
    pub fn dequeue_inactive(&mut self) -> Option<u32> {
        page_lifecycle::dequeue_inactive_for_scan()
    }
    pub fn enqueue_inactive(&mut self, page_num: u32) {
        page_lifecycle::deactivate(page_num);
    }
}

static PAGE_MANAGER: Once<Mutex<PageManager>> = Once::new();

pub fn init() {
    crate::mach_vm::addr_lock::init();
    crate::mach_vm::free_pool::init(page_lifecycle::RESERVED_PAGES, page_lifecycle::INTERRUPT_FREE_MIN);
    crate::mach_vm::percpu_cache::init();
    crate::mach_vm::page_queues::init(0);
    PAGE_MANAGER.call_once(|| Mutex::new(PageManager));
}

pub fn page_manager() -> &'static Mutex<PageManager> {
    PAGE_MANAGER.get().expect("page manager not initialized")
}

/// Initialize with a physical memory range and seed FreePool / PageQueues
/// thresholds from the resulting page count.
pub fn init_memory(start: u64, end: u64) {
    pages::init_with_memory(start, end);
    let count = pages::count();
    crate::mach_vm::page_queues::configure_thresholds(count);
    let nums: Vec<u32> = (0..count as u32).collect();
    crate::mach_vm::free_pool::free_pool().seed(nums, 0);
}

/// Legacy single-page allocate; returns the physical address of a fresh,
/// unassociated page from PerCpuCache/FreePool.
pub fn alloc_page() -> Option<u64> {
    page_lifecycle::alloc_legacy().map(page_to_addr)
}

/// Legacy single-page free.
pub fn free_page(phys_addr: u64) {
    page_lifecycle::free(addr_to_page(phys_addr));
}

pub fn page_stats() -> PageStats {
    page_lifecycle::legacy_stats()
}

pub fn memory_low() -> bool {
    page_lifecycle::memory_low()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_boundary_cases() {
        assert_eq!(VmPage::bits(0, 0), 0);
        assert_eq!(VmPage::bits(0, PAGE_SIZE), VM_PAGE_BITS_ALL);
    }

    #[test]
    fn addr_page_round_trip() {
        assert_eq!(addr_to_page(0x5000), 5);
        assert_eq!(page_to_addr(5), 0x5000);
        assert_eq!(trunc_page(0x5678), 0x5000);
        assert_eq!(round_page(0x5001), 0x6000);
    }

    #[test]
    fn busy_protocol_interleaving() {
        pages::init_for_test(4);
        let p = pages::get(0);
        assert!(p.xbusy());
        assert!(!p.try_sbusy());
        p.downgrade();
        assert!(p.try_sbusy());
        p.sunbusy();
        p.sunbusy();
        assert!(!p.is_busy());
    }

    #[test]
    fn set_valid_range_then_is_valid() {
        pages::init_for_test(4);
        let p = pages::get(1);
        p.set_valid_range(0, 512, |_, _| {});
        assert!(p.is_valid(0, 512));
    }

    #[test]
    fn set_valid_range_then_clear_dirty() {
        pages::init_for_test(4);
        let p = pages::get(2);
        p.set_valid_range(0, 1024, |_, _| {});
        p.dirty_kbi_for_test(VmPage::bits_for_test(0, 1024));
        p.clear_dirty(0, 1024);
        assert_eq!(p.dirty() & VmPage::bits(0, 1024), 0);
    }

    impl VmPage {
        fn dirty_kbi_for_test(&self, mask: u32) {
            self.dirty.fetch_or(mask, Ordering::SeqCst);
        }
        fn bits_for_test(base: usize, size: usize) -> u32 {
            Self::bits(base, size)
        }
    }
}
