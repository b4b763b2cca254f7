//! Allocation of foreign memory.
//!
//! An [`Allocator`] hands out [`Allocation`]s: owned views over regions whose
//! release is its responsibility. Each allocator tracks its live regions in
//! address order ([`TrackedRegions`]).
//!
//! `allocate` and `free` take `&mut self`; sharing one allocator between threads
//! means putting it behind a lock.

use std::{
    ops::Deref,
    sync::atomic::{AtomicU64, Ordering},
};

use xmem_common::Result;
use xmem_process::ProcessHandle;

use crate::{backend::Backend, shape::Shape, view::View};

pub mod cave;
pub mod process;
pub mod tracked;

pub use cave::{CaveAllocator, CaveRegion};
pub use process::ProcessAllocator;
pub use tracked::{TrackedRegion, TrackedRegions};

/// Identity of an allocator instance, recorded in every owned backend it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorId(u64);

impl AllocatorId {
    pub(crate) fn next() -> AllocatorId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        AllocatorId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An owned region of foreign memory.
///
/// Dereferences to the owned [`View`]. Not `Clone`: the only way to release the
/// region is to hand this value back to [`Allocator::free`] of the allocator
/// that produced it, which consumes it.
#[must_use = "the region stays reserved until the allocation is passed to Allocator::free"]
#[derive(Debug)]
pub struct Allocation {
    view: View,
}

impl Allocation {
    pub(crate) fn new(
        process: ProcessHandle,
        address: u64,
        size: usize,
        allocator: AllocatorId,
    ) -> Allocation {
        Allocation {
            view: View::new(Backend::owned(process, address, size, allocator)),
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn allocator(&self) -> AllocatorId {
        self.view
            .backend()
            .allocator()
            .unwrap_or_else(|| panic!("allocation without an owned backend"))
    }

    /// Interprets the allocation as `S`.
    ///
    /// # Panics
    ///
    /// If `S` is larger than the allocation.
    pub fn shape<S: Shape>(&self) -> S {
        assert!(
            S::SIZE <= self.view.size(),
            "shape of {} bytes does not fit an allocation of {}",
            S::SIZE,
            self.view.size()
        );
        S::from_view(self.view.clone())
    }
}

impl Deref for Allocation {
    type Target = View;

    fn deref(&self) -> &View {
        &self.view
    }
}

pub trait Allocator {
    fn id(&self) -> AllocatorId;

    /// Reserves `size` bytes.
    ///
    /// # Panics
    ///
    /// If `size` is 0.
    ///
    /// # Errors
    ///
    /// `Allocator` if no region can be produced.
    fn allocate(&mut self, size: usize) -> Result<Allocation>;

    /// Releases an allocation made by this allocator.
    ///
    /// # Panics
    ///
    /// If the allocation was produced by another allocator or is not tracked.
    fn free(&mut self, allocation: Allocation) -> Result<()>;

    /// The live regions, in address order.
    fn tracked(&self) -> &TrackedRegions;

    /// Reserves room for one `S`.
    fn allocate_for<S: Shape>(&mut self) -> Result<Allocation>
    where
        Self: Sized,
    {
        self.allocate(S::SIZE)
    }

    fn is_tracked(&self, address: u64) -> bool {
        self.tracked().contains(address)
    }
}

/// Looks up the tracked entry of `allocation`, panicking on foreign or stale
/// allocations.
fn expect_tracked(
    id: AllocatorId,
    tracked: &TrackedRegions,
    allocation: &Allocation,
) -> TrackedRegion {
    assert_eq!(
        allocation.allocator(),
        id,
        "allocation at {:#x} belongs to another allocator",
        allocation.address()
    );
    let region = tracked.get(allocation.address()).copied();
    let region = region.unwrap_or_else(|| {
        panic!(
            "allocation at {:#x} is not tracked by this allocator",
            allocation.address()
        )
    });
    assert_eq!(region.size, allocation.size());
    region
}
