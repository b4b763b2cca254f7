//! Allocation through the operating system's allocator of the target process.

use xmem_common::{Result, error::Error};
use xmem_process::ProcessHandle;

use super::{Allocation, Allocator, AllocatorId, TrackedRegion, TrackedRegions, expect_tracked};

/// Reserves every allocation as a fresh read/write/execute region of the target
/// process.
///
/// Regions come from the OS and never overlap, so bookkeeping only serves
/// `free`. Callers may place executable code in the returned memory.
#[derive(Debug)]
pub struct ProcessAllocator {
    id: AllocatorId,
    process: ProcessHandle,
    tracked: TrackedRegions,
}

impl ProcessAllocator {
    pub fn new(process: ProcessHandle) -> ProcessAllocator {
        ProcessAllocator {
            id: AllocatorId::next(),
            process,
            tracked: TrackedRegions::new(),
        }
    }

    pub fn process(&self) -> ProcessHandle {
        self.process
    }
}

impl Allocator for ProcessAllocator {
    fn id(&self) -> AllocatorId {
        self.id
    }

    fn allocate(&mut self, size: usize) -> Result<Allocation> {
        assert!(size > 0, "allocation size must be positive");
        let (address, capacity) = xmem_process::allocate(self.process, size)
            .map_err(|e| Error::allocator_os(format!("failed to reserve {size} bytes"), e))?;
        self.tracked.insert(TrackedRegion {
            address,
            size,
            capacity,
        });
        log::debug!("allocated {size} bytes at {address:#x} (capacity {capacity})");
        Ok(Allocation::new(self.process, address, size, self.id))
    }

    /// Releases the OS region, then forgets it.
    ///
    /// If the release fails the region stays tracked, since it is still reserved
    /// in the target process, and the error is returned.
    fn free(&mut self, allocation: Allocation) -> Result<()> {
        let region = expect_tracked(self.id, &self.tracked, &allocation);
        unsafe { xmem_process::free(self.process, region.address, region.capacity) }.map_err(
            |e| {
                log::warn!("failed to release region at {:#x}: {e}", region.address);
                Error::allocator_os(format!("failed to release region at {:#x}", region.address), e)
            },
        )?;
        self.tracked.remove(region.address);
        log::debug!("freed {} bytes at {:#x}", region.size, region.address);
        Ok(())
    }

    fn tracked(&self) -> &TrackedRegions {
        &self.tracked
    }
}
