//! ObjectIndex - per-object resident-page container.
//!
//! Pages are keyed by logical offset in a `BTreeMap` (point/predecessor/
//! successor lookup in O(log n)) with a parallel offset-ordered doubly
//! linked list threaded through each page's own `list_prev`/`list_next`
//! fields, giving `next`/`prev` in O(1).

use alloc::collections::btree_map::Entry;
use alloc::collections::BTreeMap;

use crate::mach_vm::vm_page::pages;

#[derive(Default, Debug)]
pub struct ObjectIndex {
    tree: BTreeMap<u64, u32>,
    head: Option<u32>,
    tail: Option<u32>,
    resident_count: usize,
    /// Stand-in for the vnode hold/drop dance: held while resident_count > 0
    /// on a vnode-backed object.
    vnode_held: bool,
}

impl ObjectIndex {
    pub const fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
            head: None,
            tail: None,
            resident_count: 0,
            vnode_held: false,
        }
    }

    pub fn lookup(&self, offset: u64) -> Option<u32> {
        self.tree.get(&offset).copied()
    }

    pub fn lookup_le(&self, offset: u64) -> Option<u32> {
        self.tree.range(..=offset).next_back().map(|(_, &v)| v)
    }

    pub fn lookup_ge(&self, offset: u64) -> Option<u32> {
        self.tree.range(offset..).next().map(|(_, &v)| v)
    }

    pub fn len(&self) -> usize {
        self.resident_count
    }

    pub fn is_empty(&self) -> bool {
        self.resident_count == 0
    }

    pub fn vnode_held(&self) -> bool {
        self.vnode_held
    }

    /// Splice `page_num` (already keyed at `offset` by the caller's choice)
    /// into the list right after `pred` (or at the head if `pred` is
    /// `None`). Fails without mutating anything if `offset` is already
    /// occupied.
    pub fn insert_after(&mut self, page_num: u32, offset: u64, pred: Option<u32>) -> Result<(), ()> {
        match self.tree.entry(offset) {
            Entry::Occupied(_) => return Err(()),
            Entry::Vacant(v) => {
                v.insert(page_num);
            }
        }

        let page = pages::get(page_num);
        match pred {
            Some(pred_num) => {
                let pred_page = pages::get(pred_num);
                let pred_next = *pred_page.list_next.lock();
                *page.list_prev.lock() = Some(pred_num);
                *page.list_next.lock() = pred_next;
                match pred_next {
                    Some(n) => *pages::get(n).list_prev.lock() = Some(page_num),
                    None => self.tail = Some(page_num),
                }
                *pred_page.list_next.lock() = Some(page_num);
            }
            None => {
                *page.list_prev.lock() = None;
                *page.list_next.lock() = self.head;
                match self.head {
                    Some(h) => *pages::get(h).list_prev.lock() = Some(page_num),
                    None => self.tail = Some(page_num),
                }
                self.head = Some(page_num);
            }
        }

        self.resident_count += 1;
        if self.resident_count == 1 {
            self.vnode_held = true;
        }
        Ok(())
    }

    /// Remove the page at `offset`, unlinking it from the list.
    pub fn remove(&mut self, offset: u64) -> Option<u32> {
        let page_num = self.tree.remove(&offset)?;
        self.unlink(page_num);
        self.resident_count -= 1;
        if self.resident_count == 0 {
            self.vnode_held = false;
        }
        Some(page_num)
    }

    /// Swap `new_page_num` in for whatever currently occupies `offset`,
    /// preserving list position, resident_count, and the vnode hold.
    /// Returns the outgoing page number.
    pub fn replace(&mut self, offset: u64, new_page_num: u32) -> Option<u32> {
        let old = *self.tree.get(&offset)?;
        self.tree.insert(offset, new_page_num);

        let old_page = pages::get(old);
        let prev = *old_page.list_prev.lock();
        let next = *old_page.list_next.lock();
        let new_page = pages::get(new_page_num);
        *new_page.list_prev.lock() = prev;
        *new_page.list_next.lock() = next;
        match prev {
            Some(p) => *pages::get(p).list_next.lock() = Some(new_page_num),
            None => self.head = Some(new_page_num),
        }
        match next {
            Some(n) => *pages::get(n).list_prev.lock() = Some(new_page_num),
            None => self.tail = Some(new_page_num),
        }
        *old_page.list_prev.lock() = None;
        *old_page.list_next.lock() = None;
        Some(old)
    }

    fn unlink(&mut self, page_num: u32) {
        let page = pages::get(page_num);
        let prev = page.list_prev.lock().take();
        let next = page.list_next.lock().take();
        match prev {
            Some(p) => *pages::get(p).list_next.lock() = next,
            None => self.head = next,
        }
        match next {
            Some(n) => *pages::get(n).list_prev.lock() = prev,
            None => self.tail = prev,
        }
    }

    pub fn next(&self, page_num: u32) -> Option<u32> {
        *pages::get(page_num).list_next.lock()
    }

    pub fn prev(&self, page_num: u32) -> Option<u32> {
        *pages::get(page_num).list_prev.lock()
    }

    pub fn head(&self) -> Option<u32> {
        self.head
    }

    pub fn tail(&self) -> Option<u32> {
        self.tail
    }

    /// Ordered keys, for the testable property that the tree and list
    /// agree exactly.
    pub fn keys_in_order(&self) -> alloc::vec::Vec<u64> {
        self.tree.keys().copied().collect()
    }

    /// Ordered (offset, page_num) pairs, for callers that need to walk
    /// every resident page (shadow collapse, slow copy, termination).
    pub fn entries(&self) -> alloc::vec::Vec<(u64, u32)> {
        self.tree.iter().map(|(&k, &v)| (k, v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_page;

    // Every test module in this crate shares one process-wide page table,
    // so each test here claims its own disjoint page-number range to stay
    // safe under parallel test execution.
    fn setup(base: u32) -> alloc::vec::Vec<u32> {
        vm_page::pages::init_for_test(base + 16);
        (base..base + 16).collect()
    }

    #[test]
    fn insert_lookup_remove() {
        let nums = setup(1000);
        let mut idx = ObjectIndex::new();
        idx.insert_after(nums[0], 0, None).unwrap();
        let pred = idx.lookup_le(4096).unwrap();
        idx.insert_after(nums[1], 4096, Some(pred)).unwrap();

        assert_eq!(idx.lookup(0), Some(nums[0]));
        assert_eq!(idx.lookup(4096), Some(nums[1]));
        assert_eq!(idx.next(nums[0]), Some(nums[1]));
        assert_eq!(idx.len(), 2);

        assert_eq!(idx.remove(0), Some(nums[0]));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.head(), Some(nums[1]));
    }

    #[test]
    fn insert_collision_fails() {
        let nums = setup(1100);
        let mut idx = ObjectIndex::new();
        idx.insert_after(nums[0], 0, None).unwrap();
        assert!(idx.insert_after(nums[1], 0, None).is_err());
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn replace_preserves_position_and_count() {
        let nums = setup(1200);
        let mut idx = ObjectIndex::new();
        idx.insert_after(nums[0], 0, None).unwrap();
        idx.insert_after(nums[1], 4096, Some(nums[0])).unwrap();
        idx.insert_after(nums[2], 8192, Some(nums[1])).unwrap();

        let old = idx.replace(4096, nums[3]).unwrap();
        assert_eq!(old, nums[1]);
        assert_eq!(idx.lookup(4096), Some(nums[3]));
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.next(nums[0]), Some(nums[3]));
        assert_eq!(idx.prev(nums[2]), Some(nums[3]));
    }

    #[test]
    fn tree_and_list_agree_in_order() {
        let nums = setup(1300);
        let mut idx = ObjectIndex::new();
        let mut pred = None;
        for (i, &n) in nums.iter().enumerate() {
            idx.insert_after(n, (i as u64) * 4096, pred).unwrap();
            pred = Some(n);
        }
        let mut via_list = alloc::vec::Vec::new();
        let mut cur = idx.head();
        while let Some(p) = cur {
            via_list.push(p);
            cur = idx.next(p);
        }
        assert_eq!(via_list, nums);
    }
}
