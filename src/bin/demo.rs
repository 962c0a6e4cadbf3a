//! Demonstration driver for the arena allocator.
//!
//! Initializes a 4096 byte arena, performs four best-fit allocations, then
//! releases them in two stages, dumping the free list after each step so the
//! splitting and coalescing behavior is visible. Run with `RUST_LOG=debug`
//! to also see the region being mapped and unmapped.

use std::ptr::NonNull;

use anyhow::Result;
use arenalloc::{Arena, Strategy};

fn log_alloc(size: usize, addr: NonNull<u8>) {
    println!("Requested {size} bytes, received address {:p}", addr.as_ptr());
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let mut arena = Arena::init(4096)?;

    let p1 = arena.allocate(16, Strategy::BestFit)?;
    log_alloc(16, p1);
    let p2 = arena.allocate(32, Strategy::BestFit)?;
    log_alloc(32, p2);
    let p3 = arena.allocate(64, Strategy::BestFit)?;
    log_alloc(64, p3);
    let p4 = arena.allocate(128, Strategy::BestFit)?;
    log_alloc(128, p4);

    println!("\nAfter the four allocations:");
    print!("{}", arena.dump());

    arena.release(p1.as_ptr())?;
    arena.release(p3.as_ptr())?;

    println!("\nAfter releasing the 16 and 64 byte blocks:");
    print!("{}", arena.dump());

    arena.release(p2.as_ptr())?;
    arena.release(p4.as_ptr())?;

    println!("\nAfter releasing everything:");
    print!("{}", arena.dump());

    Ok(())
}
