//! Allocation inside a fixed, pre-existing region of the target process.
//!
//! A cave is memory the target already has but does not use, such as padding in
//! an executable section. The allocator carves it first-fit and never talks to
//! the OS. Fragmentation is not repaired: space freed before the first live
//! allocation stays unreachable until the cave is empty again.

use serde::{Deserialize, Serialize};
use xmem_common::{Result, error::Error, verify_arg};
use xmem_process::ProcessHandle;

use super::{Allocation, Allocator, AllocatorId, TrackedRegion, TrackedRegions, expect_tracked};
use crate::{shape::Shape, view::View};

/// Location of a cave: `size` bytes starting at `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaveRegion {
    pub base: u64,
    pub size: usize,
}

impl CaveRegion {
    pub fn new(base: u64, size: usize) -> Result<CaveRegion> {
        let region = CaveRegion { base, size };
        region.validate()?;
        Ok(region)
    }

    /// Checks that the cave is non-empty and does not wrap the address space.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(size, self.size > 0);
        verify_arg!(base, self.base.checked_add(self.size as u64).is_some());
        Ok(())
    }

    pub fn end_address(&self) -> u64 {
        self.base + self.size as u64
    }
}

#[derive(Debug)]
pub struct CaveAllocator {
    id: AllocatorId,
    process: ProcessHandle,
    region: CaveRegion,
    tracked: TrackedRegions,
}

impl CaveAllocator {
    pub fn new(process: ProcessHandle, region: CaveRegion) -> Result<CaveAllocator> {
        region.validate()?;
        Ok(CaveAllocator {
            id: AllocatorId::next(),
            process,
            region,
            tracked: TrackedRegions::new(),
        })
    }

    pub fn process(&self) -> ProcessHandle {
        self.process
    }

    pub fn region(&self) -> CaveRegion {
        self.region
    }

    pub fn start_address(&self) -> u64 {
        self.region.base
    }

    pub fn end_address(&self) -> u64 {
        self.region.end_address()
    }

    /// An unowned view of the cave, bypassing bookkeeping.
    ///
    /// `size` defaults to the rest of the cave after `offset`.
    ///
    /// # Panics
    ///
    /// If the range leaves the cave.
    pub fn unchecked_view(&self, offset: usize, size: Option<usize>) -> View {
        assert!(offset <= self.region.size, "offset {offset} is past the cave");
        let size = size.unwrap_or(self.region.size - offset);
        assert!(
            offset + size <= self.region.size,
            "{size} bytes at offset {offset} leave the cave of {} bytes",
            self.region.size
        );
        View::unowned(self.process, self.region.base + offset as u64, size)
    }

    /// [`CaveAllocator::unchecked_view`] interpreted as `S`.
    pub fn unchecked_shape<S: Shape>(&self, offset: usize) -> S {
        S::from_view(self.unchecked_view(offset, Some(S::SIZE)))
    }
}

impl Allocator for CaveAllocator {
    fn id(&self) -> AllocatorId {
        self.id
    }

    fn allocate(&mut self, size: usize) -> Result<Allocation> {
        assert!(size > 0, "allocation size must be positive");
        let address = self
            .tracked
            .find_gap(size, self.start_address(), self.end_address())
            .ok_or_else(|| {
                Error::allocator(format!(
                    "cave at {:#x} has no free block of {size} bytes",
                    self.region.base
                ))
            })?;
        self.tracked.insert(TrackedRegion {
            address,
            size,
            capacity: size,
        });
        log::debug!("allocated {size} bytes at {address:#x} in cave {:#x}", self.region.base);
        Ok(Allocation::new(self.process, address, size, self.id))
    }

    fn free(&mut self, allocation: Allocation) -> Result<()> {
        let region = expect_tracked(self.id, &self.tracked, &allocation);
        self.tracked.remove(region.address);
        log::debug!("freed {} bytes at {:#x} in cave", region.size, region.address);
        Ok(())
    }

    fn tracked(&self) -> &TrackedRegions {
        &self.tracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cave(size: usize) -> CaveAllocator {
        CaveAllocator::new(ProcessHandle::current(), CaveRegion::new(0, size).unwrap()).unwrap()
    }

    fn addresses(allocator: &CaveAllocator) -> Vec<(u64, u64)> {
        allocator
            .tracked()
            .iter()
            .map(|r| (r.address, r.end_address()))
            .collect()
    }

    #[test]
    fn test_empty_cave_starts_at_base() {
        let mut allocator =
            CaveAllocator::new(ProcessHandle::current(), CaveRegion::new(0x4000, 64).unwrap())
                .unwrap();
        let a = allocator.allocate(8).unwrap();
        assert_eq!(a.address(), 0x4000);
        assert!(a.is_owned());
        assert_eq!(a.allocator(), allocator.id());
        let b = allocator.allocate(8).unwrap();
        assert_eq!(b.address(), 0x4008);
        allocator.free(a).unwrap();
        allocator.free(b).unwrap();
        assert!(allocator.tracked().is_empty());
    }

    #[test]
    fn test_first_fit() {
        let mut allocator = cave(100);
        let a = allocator.allocate(10).unwrap();
        let hole = allocator.allocate(40).unwrap();
        let b = allocator.allocate(10).unwrap();
        assert_eq!(b.address(), 50);
        allocator.free(hole).unwrap();
        assert_eq!(addresses(&allocator), [(0, 10), (50, 60)]);

        let c = allocator.allocate(20).unwrap();
        assert_eq!(c.address(), 10);
        assert_eq!(addresses(&allocator), [(0, 10), (10, 30), (50, 60)]);
        for allocation in [a, b, c] {
            allocator.free(allocation).unwrap();
        }
    }

    #[test]
    fn test_exhaustion() {
        let mut allocator = cave(20);
        let full = allocator.allocate(20).unwrap();
        assert_eq!(addresses(&allocator), [(0, 20)]);
        let err = allocator.allocate(1).unwrap_err();
        assert!(err.is_allocator());
        allocator.free(full).unwrap();
        assert_eq!(allocator.allocate(1).unwrap().address(), 0);
    }

    #[test]
    fn test_trailing_space_up_to_cave_end() {
        let mut allocator = cave(20);
        let _a = allocator.allocate(10).unwrap();
        let b = allocator.allocate(10).unwrap();
        assert_eq!(b.end_address(), allocator.end_address());
        assert!(allocator.allocate(1).is_err());
    }

    #[test]
    fn test_request_larger_than_cave() {
        let mut allocator = cave(16);
        assert!(allocator.allocate(17).unwrap_err().is_allocator());
        assert!(allocator.tracked().is_empty());
    }

    #[test]
    fn test_leading_space_not_reused() {
        let mut allocator = cave(30);
        let a = allocator.allocate(10).unwrap();
        let _b = allocator.allocate(20).unwrap();
        allocator.free(a).unwrap();
        assert!(allocator.allocate(10).unwrap_err().is_allocator());
    }

    #[test]
    fn test_random_sequences_stay_disjoint() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let mut allocator = cave(4096);
        let mut live = Vec::new();
        for _ in 0..2000 {
            if live.is_empty() || rng.bool() {
                if let Ok(allocation) = allocator.allocate(rng.usize(1..=128)) {
                    live.push(allocation);
                }
            } else {
                let allocation = live.swap_remove(rng.usize(..live.len()));
                allocator.free(allocation).unwrap();
            }

            let regions: Vec<_> = allocator.tracked().iter().copied().collect();
            assert_eq!(regions.len(), live.len());
            for pair in regions.windows(2) {
                assert!(pair[0].address < pair[1].address);
                assert!(pair[0].end_address() <= pair[1].address);
            }
            if let Some(last) = regions.last() {
                assert!(last.end_address() <= allocator.end_address());
            }
        }
        for allocation in live {
            allocator.free(allocation).unwrap();
        }
        assert!(allocator.tracked().is_empty());
    }

    #[test]
    #[should_panic]
    fn test_zero_size_panics() {
        let _ = cave(16).allocate(0);
    }

    #[test]
    #[should_panic]
    fn test_free_from_other_allocator_panics() {
        let mut first = cave(16);
        let mut second = cave(16);
        let allocation = first.allocate(4).unwrap();
        let _ = second.free(allocation);
    }

    #[test]
    fn test_cave_region_validation() {
        assert!(CaveRegion::new(0x1000, 0).is_err());
        assert!(CaveRegion::new(u64::MAX, 2).is_err());
        assert!(CaveRegion::new(0x1000, 0x200).is_ok());
        let region = CaveRegion { base: 1, size: 0 };
        assert!(CaveAllocator::new(ProcessHandle::current(), region).is_err());
    }

    #[test]
    fn test_cave_region_from_json() {
        let region: CaveRegion = serde_json::from_str(r#"{"base": 4096, "size": 512}"#).unwrap();
        assert_eq!(region, CaveRegion { base: 4096, size: 512 });
        assert_eq!(region.end_address(), 4608);
    }

    #[test]
    fn test_unchecked_view() {
        let allocator =
            CaveAllocator::new(ProcessHandle::current(), CaveRegion::new(0x8000, 64).unwrap())
                .unwrap();
        let all = allocator.unchecked_view(0, None);
        assert_eq!((all.address(), all.size()), (0x8000, 64));
        assert!(!all.is_owned());
        let tail = allocator.unchecked_view(48, None);
        assert_eq!((tail.address(), tail.size()), (0x8030, 16));
        let part = allocator.unchecked_view(8, Some(4));
        assert_eq!((part.address(), part.size()), (0x8008, 4));
        assert!(allocator.tracked().is_empty());
    }

    #[test]
    #[should_panic]
    fn test_unchecked_view_outside_cave_panics() {
        cave(16).unchecked_view(8, Some(9));
    }
}
