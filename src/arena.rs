use std::{fmt, ptr::NonNull};

use log::error;

use crate::{
    block::{self, ALIGNMENT, BLOCK_HEADER_SIZE, Block},
    error::AllocError,
    freelist::{FreeList, Strategy},
    region::Region,
    utils::align,
};

/// A fixed-size arena allocator over one mapped region.
///
/// The arena owns a single span of memory obtained from the operating system
/// at construction and carves allocations out of it until it is dropped, at
/// which point the whole span goes back to the kernel. The span never grows
/// and individual releases never return memory to the OS; they only feed the
/// free list.
///
/// Each arena is an independent value, so several can coexist in one
/// process. None of them is synchronized: share an arena across threads only
/// behind a lock of your own.
///
/// ```
/// use arenalloc::{Arena, Strategy};
///
/// let mut arena = Arena::init(4096)?;
///
/// let ptr = arena.allocate(64, Strategy::BestFit)?;
/// arena.release(ptr.as_ptr())?;
/// # Ok::<(), arenalloc::AllocError>(())
/// ```
pub struct Arena {
    /// The mapped span and its address-ordered block list.
    region: Region,
    /// Chain of free blocks, most-recently-freed first.
    free: FreeList,
    /// Error recorded by the last failing operation.
    last_error: Option<AllocError>,
}

/// Snapshot of the free list, produced by [`Arena::dump`].
///
/// It reports free space only; allocated blocks are invisible here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dump {
    /// Payload sizes of the free blocks, in free-list order.
    pub free_sizes: Vec<usize>,
}

impl fmt::Display for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "free blocks: {}", self.free_sizes.len())?;

        for size in &self.free_sizes {
            writeln!(f, "[size: {size} bytes]")?;
        }

        Ok(())
    }
}

impl Arena {
    /// Establishes a new arena of at least `capacity` bytes.
    ///
    /// The capacity is rounded up to a whole number of pages and the region
    /// is seeded as one giant free block spanning everything after the first
    /// header. A zero capacity fails with [`AllocError::BadArguments`], and
    /// so does a refusal of the operating system to map the span.
    pub fn init(capacity: usize) -> Result<Self, AllocError> {
        if capacity == 0 {
            error!("cannot initialize an arena of 0 bytes");
            return Err(AllocError::BadArguments);
        }

        let (region, first) = Region::new(capacity).inspect_err(|err| error!("{err}"))?;

        let mut free = FreeList::new();
        unsafe { free.push(first) };

        Ok(Self {
            region,
            free,
            last_error: None,
        })
    }

    /// Hands out a block of exactly `size` bytes rounded up to a multiple of
    /// 8, chosen by `strategy`.
    ///
    /// The returned pointer is the start of the payload, 8-byte aligned and
    /// disjoint from every other live block. A zero `size` fails with
    /// [`AllocError::BadArguments`]; when no free block can fit the request
    /// the call fails with [`AllocError::OutOfSpace`]. Failed calls leave the
    /// free list exactly as it was.
    pub fn allocate(&mut self, size: usize, strategy: Strategy) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(self.fail(AllocError::BadArguments));
        }

        let needed = align(size, ALIGNMENT);

        let Some(mut chosen) = (unsafe { self.free.find(needed, strategy) }) else {
            return Err(self.fail(AllocError::OutOfSpace));
        };

        unsafe {
            if chosen.as_ref().data.size >= needed + BLOCK_HEADER_SIZE {
                // Enough room left over for another header: carve the tail
                // into its own free block, which takes over the chosen
                // block's position in the free list.
                let remainder_size = chosen.as_ref().data.size - needed - BLOCK_HEADER_SIZE;
                chosen.as_mut().data.size = needed;

                let remainder_addr =
                    NonNull::new_unchecked(block::payload(chosen).as_ptr().add(needed));

                let remainder = self.region.blocks.insert_after(
                    chosen,
                    Block {
                        size: remainder_size,
                        is_free: true,
                        next_free: None,
                    },
                    remainder_addr,
                );

                self.free.replace(chosen, remainder);
            } else {
                // Too tight to split: the whole block goes out, slack
                // included.
                self.free.remove(chosen);
            }

            chosen.as_mut().data.is_free = false;
            chosen.as_mut().data.next_free = None;

            Ok(block::payload(chosen))
        }
    }

    /// Returns a block to the free list.
    ///
    /// `ptr` must be a payload pointer previously returned by
    /// [`Arena::allocate`] on this arena and not yet released. The pointer is
    /// validated against the block list before anything is touched: null,
    /// unrecognized and already-free pointers all fail with
    /// [`AllocError::BadPointer`] and mutate nothing. The foreign pointer is
    /// never dereferenced.
    ///
    /// The freed block is merged with its address-adjacent free neighbors on
    /// both sides and the surviving block is inserted at the head of the
    /// free list.
    pub fn release(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Err(self.fail(AllocError::BadPointer));
        }

        let Some(mut node) = self.region.block_at(ptr) else {
            return Err(self.fail(AllocError::BadPointer));
        };

        unsafe {
            if node.as_ref().data.is_free {
                // Double free.
                return Err(self.fail(AllocError::BadPointer));
            }

            node.as_mut().data.is_free = true;

            self.region.merge_with_next(node, &mut self.free);
            let survivor = self.region.merge_with_prev(node, &mut self.free);

            self.free.push(survivor);
        }

        Ok(())
    }

    /// Reports the payload sizes of the free blocks, in free-list order.
    /// Read-only; the arena is not touched.
    pub fn dump(&self) -> Dump {
        Dump {
            free_sizes: self.free.sizes(),
        }
    }

    /// The error recorded by the most recent failing operation, if any.
    /// Successful operations do not clear it.
    pub fn last_error(&self) -> Option<AllocError> {
        self.last_error
    }

    fn fail(&mut self, err: AllocError) -> AllocError {
        error!("{err}");
        self.last_error = Some(err);

        err
    }
}
