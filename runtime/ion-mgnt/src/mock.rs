//! Mock collaborators for host development and tests
//!
//! - `RecordingBackend`: heap backend that records creates/destroys and can be
//!   told to fail (or return nothing) for a given heap id
//! - `MockPlatform`: platform over a `RecordingBackend`, with optional region
//!   window and injectable root/registration failures
//! - `EchoResource`: shared resource that counts the requests it handles

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use crate::backend::{BackendError, HeapBackend};
use crate::device::IonDevice;
use crate::heap::{HeapDescriptor, HeapId, HeapKind};
use crate::lifecycle::{Platform, RegistrationError};
use crate::region::{RegionWindow, ReservedRegion};
use crate::share::{ShareError, ShareProxy, SharedResource};
use crate::{IonError, Result};

/// Heap handed out by `RecordingBackend`
#[derive(Debug, PartialEq, Eq)]
pub struct MockHeap {
    pub id: HeapId,
    pub kind: HeapKind,
}

/// Backend that records every call
#[derive(Debug, Default)]
pub struct RecordingBackend {
    created: Vec<HeapId>,
    destroyed: Vec<HeapId>,
    fail: Option<(HeapId, BackendError)>,
    null: Option<HeapId>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail creation of heap `id` with `err`
    pub fn fail_on(mut self, id: HeapId, err: BackendError) -> Self {
        self.fail = Some((id, err));
        self
    }

    /// Return no heap (and no error) for heap `id`
    pub fn null_on(mut self, id: HeapId) -> Self {
        self.null = Some(id);
        self
    }

    /// Ids of heaps created, in creation order
    pub fn created(&self) -> &[HeapId] {
        &self.created
    }

    /// Ids of heaps destroyed, in destruction order
    pub fn destroyed(&self) -> &[HeapId] {
        &self.destroyed
    }

    /// Heaps created and not yet destroyed
    pub fn live(&self) -> usize {
        self.created.len() - self.destroyed.len()
    }
}

impl HeapBackend for RecordingBackend {
    type Heap = MockHeap;

    fn create(&mut self, desc: &HeapDescriptor) -> core::result::Result<Option<MockHeap>, BackendError> {
        match self.fail {
            Some((id, err)) if id == desc.id => return Err(err),
            _ => {}
        }
        if self.null == Some(desc.id) {
            return Ok(None);
        }

        self.created.push(desc.id);
        Ok(Some(MockHeap {
            id: desc.id,
            kind: desc.kind,
        }))
    }

    fn destroy(&mut self, heap: MockHeap) {
        self.destroyed.push(heap.id);
    }
}

/// Platform for tests and host builds
#[derive(Debug, Default)]
pub struct MockPlatform {
    backend: RecordingBackend,
    fail_root: bool,
    fail_registration: Option<RegistrationError>,
    window: Option<RegionWindow>,
    released: Vec<ReservedRegion>,
    registered: Option<Arc<ShareProxy>>,
    registrations: usize,
    deregistrations: usize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: RecordingBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Root creation fails with `AllocationExhausted`
    pub fn fail_root(mut self) -> Self {
        self.fail_root = true;
        self
    }

    pub fn fail_heap(mut self, id: HeapId, err: BackendError) -> Self {
        self.backend = self.backend.fail_on(id, err);
        self
    }

    pub fn fail_registration(mut self, err: RegistrationError) -> Self {
        self.fail_registration = Some(err);
        self
    }

    /// Reserve fixed-region heaps out of `[base, base + size)`
    pub fn with_region_window(mut self, base: usize, size: usize) -> Self {
        self.window = Some(RegionWindow::new(base, size));
        self
    }

    pub fn backend_ref(&self) -> &RecordingBackend {
        &self.backend
    }

    pub fn registered_proxy(&self) -> Option<Arc<ShareProxy>> {
        self.registered.clone()
    }

    pub fn registrations(&self) -> usize {
        self.registrations
    }

    pub fn deregistrations(&self) -> usize {
        self.deregistrations
    }

    pub fn released_regions(&self) -> &[ReservedRegion] {
        &self.released
    }

    /// Bytes reserved from the window and not yet released
    pub fn outstanding_reservation(&self) -> usize {
        self.window.as_ref().map_or(0, RegionWindow::outstanding)
    }
}

impl Platform for MockPlatform {
    type Backend = RecordingBackend;

    fn create_root(&mut self) -> Result<IonDevice> {
        if self.fail_root {
            return Err(IonError::AllocationExhausted);
        }
        IonDevice::create()
    }

    fn backend(&mut self) -> &mut RecordingBackend {
        &mut self.backend
    }

    fn reserve_region(&mut self, desc: &HeapDescriptor) -> Option<ReservedRegion> {
        self.window
            .as_mut()
            .and_then(|window| window.reserve(desc.id, desc.size, desc.align))
    }

    fn release_region(&mut self, region: ReservedRegion) {
        if let Some(window) = self.window.as_mut() {
            window.release(region);
        }
        self.released.push(region);
    }

    fn register_share_surface(
        &mut self,
        proxy: Arc<ShareProxy>,
    ) -> core::result::Result<(), RegistrationError> {
        if let Some(err) = self.fail_registration {
            return Err(err);
        }
        self.registered = Some(proxy);
        self.registrations += 1;
        Ok(())
    }

    fn deregister_share_surface(&mut self) {
        self.registered = None;
        self.deregistrations += 1;
    }
}

/// Shared resource that answers every command and remembers the last one
#[derive(Debug, Default)]
pub struct EchoResource {
    calls: AtomicUsize,
    last: Mutex<Option<(u32, usize)>>,
}

impl EchoResource {
    /// Command the resource rejects
    pub const FAIL_CMD: u32 = 0xBAD;

    /// Error returned for `FAIL_CMD` (-EINVAL)
    pub const FAIL_ERRNO: i32 = -22;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    pub fn last_call(&self) -> Option<(u32, usize)> {
        *self.last.lock()
    }
}

impl SharedResource for EchoResource {
    fn ioctl(&self, cmd: u32, arg: usize) -> core::result::Result<isize, ShareError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        *self.last.lock() = Some((cmd, arg));

        if cmd == Self::FAIL_CMD {
            return Err(ShareError::Resource(Self::FAIL_ERRNO));
        }
        Ok((cmd as usize ^ arg) as isize)
    }
}
