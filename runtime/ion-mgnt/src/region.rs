//! Reserved regions - physical backing for fixed-region heaps
//!
//! Carveout and chunk heaps describe a region that has to exist before the
//! heap is created. When the table carries no base, the platform may reserve
//! one at attach time; the driver gives it back during cleanup.

use crate::heap::{HeapId, PhysAddr};

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Region reserved on behalf of one heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedRegion {
    /// Heap the region was reserved for
    pub heap: HeapId,

    /// Physical base address
    pub base: PhysAddr,

    /// Size in bytes
    pub size: usize,
}

impl ReservedRegion {
    pub fn end(&self) -> PhysAddr {
        self.base + self.size
    }
}

/// Bump reservations out of a fixed physical window
///
/// Released regions are not reused; the window only tracks how much is still
/// outstanding.
#[derive(Debug)]
pub struct RegionWindow {
    /// Next free physical address
    next: PhysAddr,

    /// Window base
    base: PhysAddr,

    /// Window size
    size: usize,

    /// Bytes currently reserved
    outstanding: usize,
}

impl RegionWindow {
    pub fn new(base: PhysAddr, size: usize) -> Self {
        Self {
            next: base,
            base,
            size,
            outstanding: 0,
        }
    }

    /// Reserve `size` bytes aligned to `align` (page size when zero)
    pub fn reserve(&mut self, heap: HeapId, size: usize, align: usize) -> Option<ReservedRegion> {
        let align = if align == 0 { PAGE_SIZE } else { align.max(PAGE_SIZE) };
        if !align.is_power_of_two() || size == 0 {
            return None;
        }

        let base = align_up(self.next, align);
        let end = base.checked_add(pages_needed(size) * PAGE_SIZE)?;
        if end > self.base + self.size {
            return None;
        }

        self.next = end;
        self.outstanding += size;
        Some(ReservedRegion { heap, base, size })
    }

    pub fn release(&mut self, region: ReservedRegion) {
        self.outstanding = self.outstanding.saturating_sub(region.size);
    }

    /// Bytes reserved and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Remaining space in the window
    pub fn available(&self) -> usize {
        (self.base + self.size) - self.next
    }
}

/// Number of pages covering `size` bytes
pub fn pages_needed(size: usize) -> usize {
    size.div_ceil(PAGE_SIZE)
}

/// Align `addr` up to `align` (power of two)
pub fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}
