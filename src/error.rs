use thiserror::Error;

/// Everything that can go wrong when talking to an [`Arena`](crate::Arena).
///
/// Every failing operation also records its error on the arena itself, where
/// it stays readable through [`Arena::last_error`](crate::Arena::last_error)
/// until a later failure overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The request size was zero, or the operating system refused to map the
    /// region.
    #[error("invalid request size or the region could not be mapped")]
    BadArguments,

    /// No free block is large enough for the requested size under the chosen
    /// strategy.
    #[error("no free block large enough for the request")]
    OutOfSpace,

    /// The released pointer was null, was never handed out by this arena, or
    /// refers to a block that is already free.
    #[error("pointer does not refer to a live allocation")]
    BadPointer,

    /// Reserved: a structural inconsistency was found while walking the free
    /// list. No operation currently reports this.
    #[error("free list is corrupted")]
    CorruptFreeList,

    /// Reserved: a write past the end of an allocation was detected. No
    /// operation currently reports this.
    #[error("write past the end of an allocation")]
    PaddingOverwritten,
}
