use std::ptr::NonNull;

use log::debug;

use crate::{
    block::{self, BLOCK_HEADER_SIZE, Block},
    error::AllocError,
    freelist::FreeList,
    kernel,
    list::{List, Node},
    utils::align,
};

/// The single contiguous span of memory the allocator manages.
///
/// The span is obtained from the operating system exactly once, with its
/// length rounded up to a whole number of pages, and stays at a fixed address
/// until the region is dropped. Every block the allocator ever hands out
/// lives inside it:
///
/// ```text
/// +--------------------------------------------------------------+
/// |  +--------+-------+    +--------+-------+    +------------+  |
/// |  | Header |Payload| -> | Header |Payload| -> |    ...     |  |
/// |  +--------+-------+    +--------+-------+    +------------+  |
/// +--------------------------------------------------------------+
/// ^                                                              ^
/// base                                                  base + len
/// ```
///
/// The `blocks` list is the address-ordered view of that partition: walking
/// it from the first node visits every block exactly once, free and allocated
/// alike, with no gaps in between. That ordering is what block merging relies
/// on.
pub(crate) struct Region {
    /// Base address returned by the kernel.
    base: NonNull<u8>,
    /// Mapped length, a multiple of the page size.
    len: usize,
    /// Every block of the region, in address order.
    pub blocks: List<Block>,
}

impl Region {
    /// Maps a new region of at least `capacity` bytes, rounded up to the page
    /// size, and seeds it with one free block spanning everything after the
    /// first header.
    ///
    /// Returns the region together with that initial block so the caller can
    /// thread it into its free list.
    pub fn new(capacity: usize) -> Result<(Self, NonNull<Node<Block>>), AllocError> {
        let len = align(capacity, kernel::page_size());

        let base = unsafe { kernel::request_memory(len) }.ok_or(AllocError::BadArguments)?;

        debug!("mapped a {len} byte region at {:p}", base.as_ptr());

        let mut blocks = List::new();
        let first = unsafe {
            blocks.append(
                Block {
                    size: len - BLOCK_HEADER_SIZE,
                    is_free: true,
                    next_free: None,
                },
                base,
            )
        };

        Ok((Self { base, len, blocks }, first))
    }

    /// Mapped length of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// The live block whose payload starts exactly at `ptr`, if there is one.
    ///
    /// Only addresses are compared; `ptr` itself is never dereferenced, so
    /// this is safe to call with any pointer a caller hands us.
    pub fn block_at(&self, ptr: *mut u8) -> Option<NonNull<Node<Block>>> {
        let addr = ptr as usize;
        let base = self.base.as_ptr() as usize;

        if addr < base || addr >= base + self.len {
            return None;
        }

        let mut current = self.blocks.first();

        while let Some(node) = current {
            unsafe {
                if block::payload(node).as_ptr() == ptr {
                    return Some(node);
                }

                current = node.as_ref().next;
            }
        }

        None
    }

    /// Tries to merge the block after `node` into `node`. This can be done
    /// when that next block is free: the two are address-adjacent, so `node`
    /// absorbs the neighbor's payload plus its now-reclaimed header.
    ///
    /// **SAFETY**: `node` must be a live header on this region's block list.
    pub unsafe fn merge_with_next(&mut self, mut node: NonNull<Node<Block>>, free_list: &mut FreeList) {
        unsafe {
            if let Some(next_node) = node.as_ref().next {
                if next_node.as_ref().data.is_free {
                    debug_assert_eq!(block::end(node), next_node.as_ptr().cast::<u8>());

                    // The neighbor disappears as a block, so it leaves both lists.
                    free_list.remove(next_node);
                    node.as_mut().data.size += BLOCK_HEADER_SIZE + next_node.as_ref().data.size;
                    self.blocks.remove(next_node);
                }
            }
        }
    }

    /// Tries to merge `node` into the block before it, if that block is
    /// free. Returns the surviving header: the previous block when the merge
    /// happened, `node` itself otherwise.
    ///
    /// The previous block is taken off the free list here; the caller
    /// re-inserts whichever header survives.
    ///
    /// **SAFETY**: `node` must be a live header on this region's block list.
    pub unsafe fn merge_with_prev(
        &mut self,
        node: NonNull<Node<Block>>,
        free_list: &mut FreeList,
    ) -> NonNull<Node<Block>> {
        unsafe {
            if let Some(mut prev_node) = node.as_ref().prev {
                if prev_node.as_ref().data.is_free {
                    debug_assert_eq!(block::end(prev_node), node.as_ptr().cast::<u8>());

                    free_list.remove(prev_node);
                    prev_node.as_mut().data.size += BLOCK_HEADER_SIZE + node.as_ref().data.size;
                    self.blocks.remove(node);

                    return prev_node;
                }
            }
        }

        node
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        debug!("unmapping the {} byte region at {:p}", self.len, self.base.as_ptr());

        unsafe { kernel::return_memory(self.base.as_ptr(), self.len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_rounded_up_to_whole_pages() {
        let page = kernel::page_size();

        let (region, _) = Region::new(1).unwrap();
        assert_eq!(region.len(), page);

        let (region, _) = Region::new(page + 1).unwrap();
        assert_eq!(region.len(), 2 * page);

        let (region, _) = Region::new(page).unwrap();
        assert_eq!(region.len(), page);
    }

    #[test]
    fn new_region_is_one_giant_free_block() {
        let (region, first) = Region::new(4096).unwrap();

        assert_eq!(region.blocks.len(), 1);
        assert_eq!(region.blocks.first(), Some(first));

        unsafe {
            assert!(first.as_ref().data.is_free);
            assert_eq!(first.as_ref().data.size, region.len() - BLOCK_HEADER_SIZE);
            assert_eq!(block::end(first), region.base.as_ptr().add(region.len()));
        }
    }

    #[test]
    fn block_at_only_accepts_payload_addresses() {
        let (region, first) = Region::new(4096).unwrap();

        let payload = unsafe { block::payload(first).as_ptr() };

        assert_eq!(region.block_at(payload), Some(first));
        // The header address is not a payload address.
        assert_eq!(region.block_at(region.base.as_ptr()), None);
        // Inside the payload but not at its start.
        assert_eq!(region.block_at(unsafe { payload.add(8) }), None);
        // Outside of the region entirely.
        assert_eq!(region.block_at(std::ptr::null_mut()), None);
    }
}
