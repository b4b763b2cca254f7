//! Address-ordered bookkeeping of live regions.

use std::collections::BTreeMap;

/// A region handed out by an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedRegion {
    pub address: u64,
    /// Requested size.
    pub size: usize,
    /// Size actually reserved (page-rounded for OS allocations).
    pub capacity: usize,
}

impl TrackedRegion {
    pub fn end_address(&self) -> u64 {
        self.address + self.size as u64
    }
}

/// Live regions keyed by address.
///
/// Invariants, checked on insert: no two regions share an address and no two
/// overlap in `[address, end_address)`. Nothing checks them against the foreign
/// process.
#[derive(Debug, Clone, Default)]
pub struct TrackedRegions {
    regions: BTreeMap<u64, TrackedRegion>,
}

impl TrackedRegions {
    pub fn new() -> TrackedRegions {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains(&self, address: u64) -> bool {
        self.regions.contains_key(&address)
    }

    pub fn get(&self, address: u64) -> Option<&TrackedRegion> {
        self.regions.get(&address)
    }

    /// Regions in increasing address order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedRegion> {
        self.regions.values()
    }

    /// # Panics
    ///
    /// If the region is empty, already tracked, or overlaps a tracked neighbour.
    pub fn insert(&mut self, region: TrackedRegion) {
        assert!(region.size > 0, "empty region at {:#x}", region.address);
        assert!(
            !self.contains(region.address),
            "region at {:#x} is already tracked",
            region.address
        );
        if let Some(prev) = self.regions.range(..region.address).next_back().map(|(_, r)| r) {
            assert!(
                prev.end_address() <= region.address,
                "region at {:#x} overlaps {:#x}..{:#x}",
                region.address,
                prev.address,
                prev.end_address()
            );
        }
        if let Some(next) = self.regions.range(region.address..).next().map(|(_, r)| r) {
            assert!(
                region.end_address() <= next.address,
                "region {:#x}..{:#x} overlaps {:#x}",
                region.address,
                region.end_address(),
                next.address
            );
        }
        self.regions.insert(region.address, region);
    }

    pub fn remove(&mut self, address: u64) -> Option<TrackedRegion> {
        self.regions.remove(&address)
    }

    /// First-fit search for `size` free bytes inside `[start, end)`.
    ///
    /// - no tracked regions: `start`, if the range is large enough;
    /// - otherwise the lowest gap between two consecutive regions that holds `size`;
    /// - otherwise the space after the last region, if `last_end + size <= end`.
    ///
    /// Space before the first tracked region is never considered while any region
    /// is tracked.
    pub fn find_gap(&self, size: usize, start: u64, end: u64) -> Option<u64> {
        let size = size as u64;
        let mut regions = self.regions.values();
        let Some(first) = regions.next() else {
            return (end.checked_sub(start)? >= size).then_some(start);
        };
        let mut prev_end = first.end_address();
        for region in regions {
            if region.address - prev_end >= size {
                return Some(prev_end);
            }
            prev_end = region.end_address();
        }
        (prev_end.checked_add(size)? <= end).then_some(prev_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(address: u64, size: usize) -> TrackedRegion {
        TrackedRegion {
            address,
            size,
            capacity: size,
        }
    }

    fn tracked(regions: &[(u64, usize)]) -> TrackedRegions {
        let mut t = TrackedRegions::new();
        for &(address, size) in regions {
            t.insert(region(address, size));
        }
        t
    }

    #[test]
    fn test_insert_keeps_order() {
        let t = tracked(&[(50, 10), (0, 10), (20, 5), (90, 10)]);
        let addresses: Vec<u64> = t.iter().map(|r| r.address).collect();
        assert_eq!(addresses, [0, 20, 50, 90]);
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_adjacent_regions() {
        let t = tracked(&[(0, 10), (10, 10), (20, 10)]);
        assert_eq!(t.len(), 3);
    }

    #[test]
    #[should_panic]
    fn test_duplicate_address_panics() {
        tracked(&[(0, 10), (0, 4)]);
    }

    #[test]
    #[should_panic]
    fn test_overlap_with_previous_panics() {
        tracked(&[(0, 10), (5, 10)]);
    }

    #[test]
    #[should_panic]
    fn test_overlap_with_next_panics() {
        tracked(&[(10, 10), (5, 6)]);
    }

    #[test]
    fn test_remove() {
        let mut t = tracked(&[(0, 10), (10, 10)]);
        assert_eq!(t.remove(0), Some(region(0, 10)));
        assert_eq!(t.remove(0), None);
        assert!(!t.contains(0));
        assert!(t.contains(10));
    }

    #[test]
    fn test_gap_empty() {
        let t = TrackedRegions::new();
        assert_eq!(t.find_gap(100, 1000, 1100), Some(1000));
        assert_eq!(t.find_gap(101, 1000, 1100), None);
    }

    #[test]
    fn test_gap_first_fit() {
        let t = tracked(&[(0, 10), (50, 10)]);
        assert_eq!(t.find_gap(20, 0, 100), Some(10));
        assert_eq!(t.find_gap(40, 0, 100), Some(10));
        assert_eq!(t.find_gap(41, 0, 100), None);
        assert_eq!(t.find_gap(41, 0, 101), Some(60));
    }

    #[test]
    fn test_gap_lowest_address_wins() {
        let t = tracked(&[(0, 10), (30, 10), (60, 10)]);
        assert_eq!(t.find_gap(20, 0, 100), Some(10));
        assert_eq!(t.find_gap(21, 0, 100), Some(70));
    }

    #[test]
    fn test_gap_trailing_boundary() {
        let t = tracked(&[(0, 10)]);
        assert_eq!(t.find_gap(90, 0, 100), Some(10));
        assert_eq!(t.find_gap(91, 0, 100), None);
    }

    #[test]
    fn test_gap_ignores_leading_space() {
        let t = tracked(&[(50, 50)]);
        assert_eq!(t.find_gap(10, 0, 100), None);
    }
}
