//! Mach Virtual Memory Subsystem
//!
//! Based on Mach4 vm/ subsystem.
//! Provides memory management including:
//! - vm_page: Physical page lifecycle (alloc/free/wire/hold, dirty/valid bitmaps)
//! - addr_lock, free_pool, percpu_cache, page_queues: the allocator and
//!   placement machinery vm_page builds on
//! - object_index: offset-ordered resident-page membership
//! - paging_control: suspension points and the wake signal to the pageout daemon
//! - vm_object: Memory objects (backing store abstraction)
//! - vm_map: Address space management
//! - pmap: Physical map (hardware page table management)
//! - memory_object: External memory management interface
//! - vm_pageout: Page daemon external-collaborator stub
//!
//! Note: This is separate from the EVM-related vm/ module.

pub mod addr_lock;
pub mod free_pool;
pub mod memory_object;
pub mod object_index;
pub mod page_lifecycle;
pub mod page_queues;
pub mod paging_control;
pub mod percpu_cache;
pub mod pmap;
pub mod vm_external;
pub mod vm_fault;
pub mod vm_kern;
pub mod vm_map;
pub mod vm_object;
pub mod vm_page;
pub mod vm_pageout;
pub mod vm_user;
pub mod xmm;

pub use free_pool::AllocClass;
pub use memory_object::{CopyStrategy, MemoryObject, MemoryObjectId, ReturnPolicy};
pub use page_lifecycle::AllocFlags;
pub use pmap::{pmap_create, pmap_enter, pmap_extract, pmap_find, pmap_protect, pmap_remove, Pmap, PmapId};
pub use vm_external::{vm_external_create, vm_external_state_get, VmExternal, VmExternalState};
pub use vm_map::{EntryFlags, VmInherit, VmMap, VmMapEntry, VmMapId, VmProt};
pub use vm_object::{ObjectFlags, VmObject, VmObjectId};
pub use vm_page::{PageFlags, PageQueueType, VmPage, PAGE_SIZE};
pub use xmm::{create_default_object, DefaultMemoryObject, ExistenceMap, XmmMethods, XmmObject};

/// Initialize the Mach VM subsystem
pub fn init() {
    // vm_page::init() brings up addr_lock, free_pool, percpu_cache and
    // page_queues in the order they depend on each other.
    vm_page::init();
    vm_object::init();
    vm_map::init();
    pmap::init();
    memory_object::init();
    vm_pageout::init();
    vm_external::init();
}

/// Initialize VM subsystem with physical memory range
///
/// This should be called after basic init() with the actual physical
/// memory range discovered during boot.
pub fn init_with_memory(start: u64, end: u64) {
    // Seeds the free pool and configures page_queues thresholds from the
    // resulting page count.
    vm_page::init_memory(start, end);

    let total_pages = ((end - start) / vm_page::PAGE_SIZE as u64) as u32;
    vm_pageout::configure(total_pages);
    vm_pageout::start();
}
