//! Device Root
//!
//! The single allocator identity clients talk to. Heaps are attached to it in
//! pool order; allocation requests pick a heap from the attached set.

use alloc::string::String;
use alloc::vec::Vec;

use crate::heap::{HeapId, HeapKind};
use crate::pool::LiveHeap;
use crate::{IonError, Result};

/// Attached heap as reported by a heap query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapInfo {
    pub id: HeapId,
    pub kind: HeapKind,
    pub name: String,
}

/// The allocator device
#[derive(Debug)]
pub struct IonDevice {
    /// Attached heaps, in attach order
    heaps: Vec<HeapInfo>,

    /// Cleared by `destroy`
    live: bool,
}

impl IonDevice {
    /// Heap records reserved up front, one per reference heap kind
    const INITIAL_HEAPS: usize = HeapKind::ALL.len();

    /// Create the allocator identity
    ///
    /// # Errors
    /// `AllocationExhausted` if the bookkeeping cannot be allocated
    pub fn create() -> Result<Self> {
        let mut heaps = Vec::new();
        heaps.try_reserve_exact(Self::INITIAL_HEAPS)?;

        Ok(Self { heaps, live: true })
    }

    /// Register a live heap; later allocation requests can select it
    pub fn attach_heap<H>(&mut self, heap: &LiveHeap<H>, name: &str) {
        log::debug!("ion: attach heap {} ({}, {})", heap.id(), heap.kind(), name);

        self.heaps.push(HeapInfo {
            id: heap.id(),
            kind: heap.kind(),
            name: String::from(name),
        });
    }

    /// Forget a heap that is about to be destroyed
    pub fn detach_heap(&mut self, id: HeapId) -> bool {
        match self.heaps.iter().position(|h| h.id == id) {
            Some(index) => {
                self.heaps.remove(index);
                true
            }
            None => false,
        }
    }

    /// Invalidate the device
    ///
    /// Every heap must have been released first. Heaps still attached at this
    /// point are a caller bug; their records are dropped.
    pub fn destroy(&mut self) {
        if !self.heaps.is_empty() {
            log::error!(
                "ion: destroying device with {} heap(s) still attached",
                self.heaps.len()
            );
            self.heaps.clear();
        }
        self.live = false;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn heap_count(&self) -> usize {
        self.heaps.len()
    }

    pub fn heap_ids(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.heaps.iter().map(|h| h.id)
    }

    /// Snapshot of the attached heaps
    pub fn heap_query(&self) -> Result<Vec<HeapInfo>> {
        if !self.live {
            return Err(IonError::DeviceDestroyed);
        }
        Ok(self.heaps.clone())
    }

    /// Resolve an allocation request's heap id mask to the heap serving it
    ///
    /// Heaps are tried in attach order; bit `n` of the mask selects heap id `n`.
    pub fn select_heap(&self, heap_id_mask: u32) -> Result<HeapId> {
        if !self.live {
            return Err(IonError::DeviceDestroyed);
        }

        self.heaps
            .iter()
            .find(|h| h.id < u32::BITS && heap_id_mask & (1 << h.id) != 0)
            .map(|h| h.id)
            .ok_or(IonError::NoMatchingHeap { mask: heap_id_mask })
    }
}
