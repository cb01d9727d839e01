//! Heap Pool Registry
//!
//! Brings every eligible heap of a `HeapPoolConfig` up against a backend and
//! attaches it to the device root, all-or-nothing.
//!
//! # Bring-up
//! The slot array (one optional heap per descriptor) is the unit of rollback.
//! Each heap is attached to the root as soon as the backend hands it out, so a
//! failure later in the table unwinds every slot filled so far: detach from the
//! root, then destroy through the backend. The root itself is left alone.

use alloc::vec::Vec;

use crate::backend::{BackendError, HeapBackend};
use crate::device::IonDevice;
use crate::heap::{HeapDescriptor, HeapId, HeapKind, HeapPoolConfig};
use crate::{IonError, Result};

/// A heap the backend created and the root knows about
#[derive(Debug)]
pub struct LiveHeap<H> {
    id: HeapId,
    kind: HeapKind,
    handle: H,
}

impl<H> LiveHeap<H> {
    pub fn new(id: HeapId, kind: HeapKind, handle: H) -> Self {
        Self { id, kind, handle }
    }

    pub fn id(&self) -> HeapId {
        self.id
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

type Slots<H> = Vec<Option<LiveHeap<H>>>;

/// Detach and destroy every occupied slot, leaving them empty
fn release_slots<B: HeapBackend>(
    slots: &mut [Option<LiveHeap<B::Heap>>],
    root: &mut IonDevice,
    backend: &mut B,
) -> usize {
    let mut released = 0;

    for slot in slots.iter_mut().rev() {
        if let Some(heap) = slot.take() {
            root.detach_heap(heap.id);
            backend.destroy(heap.handle);
            released += 1;
        }
    }

    released
}

/// In-progress bring-up; unwinds every filled slot unless committed
struct Bringup<'a, B: HeapBackend> {
    root: &'a mut IonDevice,
    backend: &'a mut B,
    slots: Slots<B::Heap>,
}

impl<'a, B: HeapBackend> Bringup<'a, B> {
    fn fail(&self, desc: &HeapDescriptor, underlying: BackendError) -> IonError {
        log::error!(
            "ion: failed to create heap {} ({}, {}): {}",
            desc.id,
            desc.kind,
            desc.name,
            underlying
        );

        IonError::BackendCreateFailed {
            descriptor_id: desc.id,
            underlying,
        }
    }

    fn commit(mut self) -> Slots<B::Heap> {
        core::mem::take(&mut self.slots)
    }
}

impl<B: HeapBackend> Drop for Bringup<'_, B> {
    fn drop(&mut self) {
        let released = release_slots(&mut self.slots, &mut *self.root, &mut *self.backend);
        if released > 0 {
            log::error!("ion: rolled back {} heap(s)", released);
        }
    }
}

/// The live pool: one slot per configured heap, empty for skipped heaps
#[derive(Debug)]
pub struct HeapPool<H> {
    slots: Slots<H>,
}

impl<H> HeapPool<H> {
    /// Create and attach every provisioned heap of `config`
    ///
    /// Carveout and chunk heaps without a base address are skipped, not failed.
    ///
    /// # Errors
    /// - `AllocationExhausted` if the slot array cannot be allocated
    /// - `BackendCreateFailed` naming the first heap the backend refused (or
    ///   returned nothing for); every heap created before it has been detached
    ///   and destroyed by then
    pub fn build<B>(config: &HeapPoolConfig, root: &mut IonDevice, backend: &mut B) -> Result<Self>
    where
        B: HeapBackend<Heap = H>,
    {
        let mut slots = Vec::new();
        slots.try_reserve_exact(config.len())?;
        slots.resize_with(config.len(), || None);

        let mut bringup = Bringup {
            root,
            backend,
            slots,
        };

        for (index, desc) in config.iter().enumerate() {
            if !desc.is_provisioned() {
                log::debug!("ion: skipping {} heap {}, no region", desc.kind, desc.id);
                continue;
            }

            let heap = match bringup.backend.create(desc) {
                Ok(Some(handle)) => LiveHeap::new(desc.id, desc.kind, handle),
                Ok(None) => return Err(bringup.fail(desc, BackendError::NullHeap)),
                Err(err) => return Err(bringup.fail(desc, err)),
            };

            bringup.root.attach_heap(&heap, &desc.name);
            bringup.slots[index] = Some(heap);
        }

        Ok(Self {
            slots: bringup.commit(),
        })
    }

    /// Destroy every live heap and release the slot array
    ///
    /// Safe on a pool with skipped slots and on one already destroyed.
    pub fn destroy<B>(&mut self, root: &mut IonDevice, backend: &mut B)
    where
        B: HeapBackend<Heap = H>,
    {
        release_slots(&mut self.slots, root, backend);
        self.slots = Vec::new();
    }

    /// Number of live heaps
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of slots (configured heaps), zero once destroyed
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: HeapId) -> Option<&LiveHeap<H>> {
        self.iter().find(|h| h.id == id)
    }

    /// Live heaps in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &LiveHeap<H>> + '_ {
        self.slots.iter().flatten()
    }
}

impl<H> Drop for HeapPool<H> {
    fn drop(&mut self) {
        let live = self.live_count();
        if live > 0 {
            log::warn!("ion: heap pool dropped with {} live heap(s)", live);
        }
    }
}
