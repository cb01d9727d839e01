//! Heap backend contract
//!
//! The allocation strategy of each heap kind lives outside this crate. The pool
//! only needs two things from it: turn a descriptor into a heap, and give the
//! heap back. `KindBackend` routes both calls to one `HeapFactory` per kind.

use alloc::boxed::Box;
use thiserror::Error;

use crate::heap::{HeapDescriptor, HeapKind};

/// Failure reported by a backend while creating a heap
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend returned no heap")]
    NullHeap,

    #[error("out of memory")]
    OutOfMemory,

    #[error("no backend for {0} heaps")]
    Unsupported(HeapKind),

    #[error("backend error {0}")]
    Failed(i32),
}

/// Creates and destroys heaps
pub trait HeapBackend {
    /// Opaque heap handle
    type Heap;

    /// Create the heap described by `desc`
    ///
    /// `Ok(None)` is a backend that produced nothing without saying why. The
    /// pool treats it exactly like an error.
    fn create(&mut self, desc: &HeapDescriptor) -> Result<Option<Self::Heap>, BackendError>;

    /// Release everything the heap owns
    ///
    /// Must not fail observably and must not depend on the order in which
    /// heaps are destroyed.
    fn destroy(&mut self, heap: Self::Heap);
}

/// Strategy for a single heap kind
pub trait HeapFactory {
    type Heap;

    fn create(&mut self, desc: &HeapDescriptor) -> Result<Option<Self::Heap>, BackendError>;

    fn destroy(&mut self, heap: Self::Heap);
}

/// Heap created through a `KindBackend`, remembers which factory owns it
#[derive(Debug)]
pub struct KindHeap<H> {
    kind: HeapKind,
    heap: H,
}

impl<H> KindHeap<H> {
    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn inner(&self) -> &H {
        &self.heap
    }
}

type BoxedFactory<H> = Box<dyn HeapFactory<Heap = H> + Send>;

/// Backend that dispatches on the descriptor's kind tag
pub struct KindBackend<H> {
    factories: [Option<BoxedFactory<H>>; HeapKind::ALL.len()],
}

impl<H> KindBackend<H> {
    pub fn new() -> Self {
        Self {
            factories: Default::default(),
        }
    }

    /// Install the strategy for `kind`, replacing any previous one
    pub fn register<F>(&mut self, kind: HeapKind, factory: F) -> &mut Self
    where
        F: HeapFactory<Heap = H> + Send + 'static,
    {
        self.factories[kind.type_id() as usize] = Some(Box::new(factory));
        self
    }

    pub fn supports(&self, kind: HeapKind) -> bool {
        self.factories[kind.type_id() as usize].is_some()
    }

    fn factory(&mut self, kind: HeapKind) -> Option<&mut BoxedFactory<H>> {
        self.factories[kind.type_id() as usize].as_mut()
    }
}

impl<H> Default for KindBackend<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> HeapBackend for KindBackend<H> {
    type Heap = KindHeap<H>;

    fn create(&mut self, desc: &HeapDescriptor) -> Result<Option<Self::Heap>, BackendError> {
        let factory = self
            .factory(desc.kind)
            .ok_or(BackendError::Unsupported(desc.kind))?;

        Ok(factory.create(desc)?.map(|heap| KindHeap {
            kind: desc.kind,
            heap,
        }))
    }

    fn destroy(&mut self, heap: Self::Heap) {
        match self.factory(heap.kind) {
            Some(factory) => factory.destroy(heap.heap),
            None => log::warn!("ion: no {} factory left to destroy heap", heap.kind),
        }
    }
}
