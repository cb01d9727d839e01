//! ION management - heap pool lifecycle and share proxy
//!
//! # Purpose
//! Brings a set of heterogeneous memory heaps up behind a single allocator
//! device, all-or-nothing, and exposes a second "share" control surface that
//! forwards requests to one externally published shared resource.
//!
//! # Integration Points
//! - Depends on: a heap backend (per-kind allocation strategies), a platform
//!   (device root creation, region reservation, share surface registration)
//! - Provides to: the hosting environment (`HostLifecycle`), clients of the
//!   share surface (`ShareProxy::ioctl`)
//!
//! # Architecture
//! ```text
//!  on_attach                                   on_detach
//!     │                                            │
//!     ▼                                            ▼
//!  IonDevice::create ─► HeapPool::build ─► share surface registration
//!                          │  (rollback on failure)
//!                          ▼
//!                    HeapBackend (KindBackend ─► HeapFactory per kind)
//! ```
//!
//! # Testing Strategy
//! - Unit tests: descriptor validation, rollback, proxy forwarding
//! - Integration tests: end-to-end attach/detach against the mock platform
//! - Benches: proxy forwarding throughput

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

pub mod backend;
pub mod device;
pub mod heap;
pub mod lifecycle;
pub mod pool;
pub mod region;
pub mod share;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::{BackendError, HeapBackend, HeapFactory, KindBackend, KindHeap};
pub use device::{HeapInfo, IonDevice};
pub use heap::{HeapDescriptor, HeapId, HeapKind, HeapPoolConfig, PhysAddr, SZ_16K, SZ_4M};
pub use lifecycle::{HostLifecycle, IonContext, IonDriver, LifecycleState, Platform, RegistrationError};
pub use pool::{HeapPool, LiveHeap};
pub use region::{RegionWindow, ReservedRegion, PAGE_SIZE};
pub use share::{ProxyState, ShareError, ShareProxy, SharedResource, SHARE_MODE_ACK, SHARE_MODE_CMD};

use thiserror::Error;

/// Error types for pool lifecycle and device operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IonError {
    #[error("heap {descriptor_id} backend create failed: {underlying}")]
    BackendCreateFailed {
        descriptor_id: HeapId,
        underlying: BackendError,
    },

    #[error("out of memory for heap bookkeeping")]
    AllocationExhausted,

    #[error("share surface registration failed: {0}")]
    ProxyRegistrationFailed(RegistrationError),

    #[error("device root has been destroyed")]
    DeviceDestroyed,

    #[error("no attached heap matches mask {mask:#x}")]
    NoMatchingHeap { mask: u32 },

    #[error("duplicate heap id {0}")]
    DuplicateHeapId(HeapId),

    #[error("invalid descriptor for heap {id}: {reason}")]
    InvalidDescriptor { id: HeapId, reason: &'static str },

    #[error("driver already attached")]
    AlreadyAttached,

    #[error("device root from a failed attach is still live, detach first")]
    StaleRoot,
}

pub type Result<T> = core::result::Result<T, IonError>;

impl From<alloc::collections::TryReserveError> for IonError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        IonError::AllocationExhausted
    }
}
