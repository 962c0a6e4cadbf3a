use std::{mem, ptr::NonNull};

use crate::list::{Link, Node};

/// Header size of a block. We need to add the overhead introduced by our
/// [`Node`] structure since a block header is always the node that links it
/// into the region's block list.
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<Node<Block>>();

/// Payload sizes and payload addresses are always a multiple of this.
/// Requested sizes get rounded up to it before any free block is considered.
pub(crate) const ALIGNMENT: usize = 8;

/// This is the structure of a block. The fields of the block are its
/// metadata, content is placed after this header.
///
/// The following diagram represents this structure, ignoring that the block
/// will be wrapped inside a [`Node`]:
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        | -> Header
/// +---------------------+        |
/// |      next_free      |        |
/// +---------------------+ <------+
/// |       Payload       |        |
/// |         ...         |        |
/// |         ...         |        | -> Addressable content
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// The pointer handed to the caller is the payload address; the header stays
/// invisible to it. `next_free` threads the block into the free list and is
/// only meaningful while `is_free` is set.
pub(crate) struct Block {
    /// Payload capacity in bytes, excluding the header.
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Next block in the free list. Garbage while the block is allocated.
    pub next_free: Link<Node<Block>>,
}

/// Address of the payload that follows `block`'s header.
#[inline]
pub(crate) unsafe fn payload(block: NonNull<Node<Block>>) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(block.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE)) }
}

/// One-past-the-end address of `block`, header and payload included. Two
/// blocks are address-adjacent when the first one's end is the second one's
/// header address.
#[inline]
pub(crate) unsafe fn end(block: NonNull<Node<Block>>) -> *mut u8 {
    unsafe {
        block
            .as_ptr()
            .cast::<u8>()
            .add(BLOCK_HEADER_SIZE + block.as_ref().data.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_keeps_payloads_aligned() {
        // A payload directly follows its header, so the header size itself
        // has to be a multiple of the payload alignment.
        assert_eq!(BLOCK_HEADER_SIZE % ALIGNMENT, 0);
        assert!(mem::align_of::<Node<Block>>() <= ALIGNMENT);
    }
}
