//! Driver Lifecycle Controller
//!
//! Attach brings the subsystem up in a fixed order:
//!
//! ```text
//! Uninitialized ─► RootCreated ─► PoolBuilding ─► PoolLive ─► ProxyRegistered
//!       ▲                              │                            │
//!       └──────── rollback ────────────┘                            │
//!       └──────────────────────── detach ───────────────────────────┘
//! ```
//!
//! Detach tears down the pool, then the root, then the share surface, and is
//! safe from any partially attached state. All runtime state lives in an
//! `IonContext` owned by the driver; nothing is global.

use alloc::sync::Arc;
use alloc::vec::Vec;
use thiserror::Error;

use crate::backend::HeapBackend;
use crate::device::IonDevice;
use crate::heap::{HeapDescriptor, HeapPoolConfig};
use crate::pool::HeapPool;
use crate::region::ReservedRegion;
use crate::share::ShareProxy;
use crate::{IonError, Result};

/// Failure to publish the share control surface
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("surface name already registered")]
    NameTaken,

    #[error("no free device minor")]
    NoMinor,

    #[error("registration failed: {0}")]
    Failed(i32),
}

/// Services the hosting platform provides to the driver
pub trait Platform {
    type Backend: HeapBackend;

    /// Create the allocator identity
    fn create_root(&mut self) -> Result<IonDevice> {
        IonDevice::create()
    }

    fn backend(&mut self) -> &mut Self::Backend;

    /// Reserve backing for a fixed-region heap that has no base
    ///
    /// `None` leaves the heap unprovisioned; it is skipped.
    fn reserve_region(&mut self, _desc: &HeapDescriptor) -> Option<ReservedRegion> {
        None
    }

    fn release_region(&mut self, _region: ReservedRegion) {}

    /// Publish the share control surface
    fn register_share_surface(&mut self, proxy: Arc<ShareProxy>) -> core::result::Result<(), RegistrationError>;

    fn deregister_share_surface(&mut self);
}

/// Hooks the hosting environment calls, once each, load then unload
pub trait HostLifecycle {
    fn on_attach(&mut self) -> Result<()>;

    fn on_detach(&mut self);
}

/// Attach progress
///
/// `RootCreated` and `PoolBuilding` only hold while `attach` runs; a failed
/// attach always leaves the driver `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    RootCreated,
    PoolBuilding,
    PoolLive,
    ProxyRegistered,
}

/// Everything the driver owns between attach and detach
#[derive(Debug)]
pub struct IonContext<H> {
    root: Option<IonDevice>,
    pool: Option<HeapPool<H>>,
    proxy: Arc<ShareProxy>,
    proxy_registered: bool,
    reservations: Vec<ReservedRegion>,
}

impl<H> IonContext<H> {
    fn new() -> Self {
        Self {
            root: None,
            pool: None,
            proxy: Arc::new(ShareProxy::new()),
            proxy_registered: false,
            reservations: Vec::new(),
        }
    }

    pub fn root(&self) -> Option<&IonDevice> {
        self.root.as_ref()
    }

    pub fn pool(&self) -> Option<&HeapPool<H>> {
        self.pool.as_ref()
    }

    pub fn proxy(&self) -> &Arc<ShareProxy> {
        &self.proxy
    }

    pub fn is_proxy_registered(&self) -> bool {
        self.proxy_registered
    }

    /// Regions reserved for this attach
    pub fn reservations(&self) -> &[ReservedRegion] {
        &self.reservations
    }

    /// Live heap count, zero without a pool
    pub fn live_heaps(&self) -> usize {
        self.pool.as_ref().map_or(0, HeapPool::live_count)
    }
}

type HeapOf<P> = <<P as Platform>::Backend as HeapBackend>::Heap;

/// The ION management driver
pub struct IonDriver<P: Platform> {
    platform: P,
    config: HeapPoolConfig,
    state: LifecycleState,
    ctx: IonContext<HeapOf<P>>,
}

impl<P: Platform> IonDriver<P> {
    pub fn new(platform: P, config: HeapPoolConfig) -> Self {
        Self {
            platform,
            config,
            state: LifecycleState::Uninitialized,
            ctx: IonContext::new(),
        }
    }

    /// Driver over the compiled-in heap table
    pub fn with_default_heaps(platform: P) -> Self {
        Self::new(platform, HeapPoolConfig::default_heaps())
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &HeapPoolConfig {
        &self.config
    }

    pub fn context(&self) -> &IonContext<HeapOf<P>> {
        &self.ctx
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Handle to the share proxy, for whoever publishes the shared resource
    ///
    /// Each detach replaces the proxy; a handle taken before it stays bound to
    /// the old resource and is no longer published.
    pub fn share_proxy(&self) -> Arc<ShareProxy> {
        self.ctx.proxy.clone()
    }

    /// Bring the root, the heap pool and the share surface up
    ///
    /// A pool failure rolls every heap back and returns the root-cause error.
    /// The root survives it; `detach` must still be called. A share surface
    /// that cannot be registered is logged and the allocator stays usable.
    ///
    /// # Errors
    /// - `AlreadyAttached` unless uninitialized
    /// - `StaleRoot` when a failed attach left its root behind
    /// - root creation and pool bring-up errors, unchanged
    pub fn attach(&mut self) -> Result<()> {
        if self.state != LifecycleState::Uninitialized {
            return Err(IonError::AlreadyAttached);
        }
        if self.ctx.root.is_some() {
            return Err(IonError::StaleRoot);
        }

        let mut root = self.platform.create_root()?;
        self.state = LifecycleState::RootCreated;
        log::debug!("ion: device root created");

        self.state = LifecycleState::PoolBuilding;
        let pool = match self.build_pool(&mut root) {
            Ok(pool) => pool,
            Err(err) => {
                self.release_reservations();
                self.ctx.root = Some(root);
                self.state = LifecycleState::Uninitialized;
                return Err(err);
            }
        };

        self.ctx.root = Some(root);
        self.ctx.pool = Some(pool);
        self.state = LifecycleState::PoolLive;
        log::info!("ion: started");

        match self.platform.register_share_surface(self.ctx.proxy.clone()) {
            Ok(()) => {
                self.ctx.proxy_registered = true;
                self.state = LifecycleState::ProxyRegistered;
            }
            Err(err) => {
                log::warn!("ion: {}", IonError::ProxyRegistrationFailed(err));
            }
        }

        Ok(())
    }

    /// Tear down whatever attach managed to bring up
    pub fn detach(&mut self) {
        if let Some(root) = self.ctx.root.as_mut() {
            if let Some(mut pool) = self.ctx.pool.take() {
                pool.destroy(root, self.platform.backend());
            }
            root.destroy();
        }
        self.ctx.root = None;

        if self.ctx.proxy_registered {
            self.platform.deregister_share_surface();
            self.ctx.proxy_registered = false;
        }

        self.release_reservations();
        self.ctx = IonContext::new();
        self.state = LifecycleState::Uninitialized;
        log::info!("ion: removed");
    }

    fn build_pool(&mut self, root: &mut IonDevice) -> Result<HeapPool<HeapOf<P>>> {
        let config = self.provision()?;
        HeapPool::build(&config, root, self.platform.backend())
    }

    /// Copy of the table with platform regions filled in for base-less
    /// fixed-region heaps
    fn provision(&mut self) -> Result<HeapPoolConfig> {
        let mut heaps = Vec::new();
        heaps.try_reserve_exact(self.config.len())?;

        for desc in self.config.iter() {
            let mut desc = desc.clone();
            if !desc.is_provisioned() {
                if let Some(region) = self.platform.reserve_region(&desc) {
                    log::debug!(
                        "ion: reserved {:#x}..{:#x} for heap {}",
                        region.base,
                        region.end(),
                        desc.id
                    );
                    desc.base = Some(region.base);
                    self.ctx.reservations.push(region);
                }
            }
            heaps.push(desc);
        }

        HeapPoolConfig::new(heaps)
    }

    fn release_reservations(&mut self) {
        for region in self.ctx.reservations.drain(..) {
            self.platform.release_region(region);
        }
    }
}

impl<P: Platform> HostLifecycle for IonDriver<P> {
    fn on_attach(&mut self) -> Result<()> {
        self.attach()
    }

    fn on_detach(&mut self) {
        self.detach()
    }
}

impl<P: Platform> Drop for IonDriver<P> {
    fn drop(&mut self) {
        if self.ctx.root.is_some() {
            log::warn!("ion: driver dropped without detach");
        }
    }
}
