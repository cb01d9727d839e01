//! Integration tests for the complete attach/detach flow
//!
//! These tests drive the driver the way a hosting environment does:
//! - on_attach, use the allocator and the share surface, on_detach
//! - injected backend failures and the rollback they trigger
//! - concurrent forwarding through a bound share proxy

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ion_mgnt::mock::{EchoResource, MockPlatform};
use ion_mgnt::*;

/// Scenario A: default table, no bases for carveout/chunk
#[test]
fn test_default_table_without_bases() {
    let mut driver = IonDriver::with_default_heaps(MockPlatform::new());
    driver.on_attach().expect("attach failed");

    let ctx = driver.context();
    assert_eq!(ctx.live_heaps(), 2);

    let root = ctx.root().expect("root missing");
    let kinds: Vec<_> = root
        .heap_query()
        .unwrap()
        .into_iter()
        .map(|info| info.kind)
        .collect();
    assert_eq!(kinds, [HeapKind::System, HeapKind::SystemContig]);

    // Only the on-demand heaps can serve requests
    assert_eq!(root.select_heap(1 << 1), Ok(1));
    assert_eq!(
        root.select_heap(1 << 2),
        Err(IonError::NoMatchingHeap { mask: 1 << 2 })
    );

    driver.on_detach();
    assert_eq!(driver.platform().backend_ref().live(), 0);
}

/// Scenario B: carveout backend forced to fail
#[test]
fn test_carveout_failure_rolls_back_system_heap() {
    let config = HeapPoolConfig::new(vec![
        HeapDescriptor::new(0, HeapKind::System, "system-heap"),
        HeapDescriptor::new(2, HeapKind::Carveout, "carveout")
            .with_size(SZ_4M)
            .with_base(0x8000_0000),
    ])
    .unwrap();

    let platform = MockPlatform::new().fail_heap(2, BackendError::OutOfMemory);
    let mut driver = IonDriver::new(platform, config);

    let err = driver.on_attach().unwrap_err();
    assert_eq!(
        err,
        IonError::BackendCreateFailed {
            descriptor_id: 2,
            underlying: BackendError::OutOfMemory,
        }
    );

    let backend = driver.platform().backend_ref();
    assert_eq!(backend.created(), [0]);
    assert_eq!(backend.destroyed(), [0]);
    assert_eq!(driver.context().live_heaps(), 0);
    assert_eq!(driver.context().root().unwrap().heap_count(), 0);

    driver.on_detach();
    assert!(driver.context().root().is_none());
}

/// Scenario C: reserved command never reaches the bound resource
#[test]
fn test_share_mode_command_answered_locally() {
    let mut driver = IonDriver::with_default_heaps(MockPlatform::new());
    driver.on_attach().unwrap();

    let resource = Arc::new(EchoResource::new());
    driver.share_proxy().bind(resource.clone()).unwrap();

    let proxy = driver.platform().registered_proxy().unwrap();
    assert_eq!(proxy.ioctl(0xFFFF_FFFF, 0x1234), Ok(SHARE_MODE_ACK));
    assert_eq!(resource.calls(), 0);
    assert_eq!(resource.last_call(), None);

    driver.on_detach();
}

#[test]
fn test_forwarding_matches_direct_call() {
    let proxy = ShareProxy::new();
    let resource = Arc::new(EchoResource::new());
    proxy.bind(resource.clone()).unwrap();

    for (cmd, arg) in [(0u32, 0usize), (0x4008_4900, 0x7fff_0000), (EchoResource::FAIL_CMD, 9)] {
        let direct = resource.ioctl(cmd, arg);
        assert_eq!(proxy.ioctl(cmd, arg), direct);
        assert_eq!(resource.last_call(), Some((cmd, arg)));
    }

    assert_eq!(
        proxy.ioctl(EchoResource::FAIL_CMD, 0),
        Err(ShareError::Resource(EchoResource::FAIL_ERRNO))
    );
}

#[test]
fn test_concurrent_forwarding() {
    const THREADS: usize = 8;
    const CALLS: usize = 1_000;

    let proxy = Arc::new(ShareProxy::new());
    let resource = Arc::new(EchoResource::new());
    proxy.bind(resource.clone()).unwrap();

    crossbeam::scope(|s| {
        for t in 0..THREADS {
            let proxy = &proxy;
            s.spawn(move |_| {
                for i in 0..CALLS {
                    let result = proxy.ioctl(t as u32, i).unwrap();
                    assert_eq!(result, (t ^ i) as isize);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(resource.calls(), THREADS * CALLS);
}

#[test]
fn test_bind_races_settle_on_one_resource() {
    let proxy = Arc::new(ShareProxy::new());
    let resources: Vec<_> = (0..4).map(|_| Arc::new(EchoResource::new())).collect();
    let winners = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for resource in &resources {
            let proxy = &proxy;
            let winners = &winners;
            s.spawn(move |_| {
                if proxy.bind(resource.clone()).is_ok() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(winners.load(Ordering::SeqCst), 1);

    proxy.ioctl(1, 1).unwrap();
    let total: usize = resources.iter().map(|r| r.calls()).sum();
    assert_eq!(total, 1);
}

/// Allocation strategies that do nothing but count
struct CountingFactory {
    live: Arc<AtomicUsize>,
}

impl HeapFactory for CountingFactory {
    type Heap = HeapId;

    fn create(&mut self, desc: &HeapDescriptor) -> std::result::Result<Option<HeapId>, BackendError> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Some(desc.id))
    }

    fn destroy(&mut self, _heap: HeapId) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Platform whose backend dispatches per heap kind and that has no region to
/// hand out, and no share surface
struct KindPlatform {
    backend: KindBackend<HeapId>,
}

impl Platform for KindPlatform {
    type Backend = KindBackend<HeapId>;

    fn backend(&mut self) -> &mut KindBackend<HeapId> {
        &mut self.backend
    }

    fn register_share_surface(&mut self, _proxy: Arc<ShareProxy>) -> std::result::Result<(), RegistrationError> {
        Err(RegistrationError::NameTaken)
    }

    fn deregister_share_surface(&mut self) {
        unreachable!("never registered");
    }
}

#[test]
fn test_kind_dispatch_through_lifecycle() {
    let live = Arc::new(AtomicUsize::new(0));
    let mut backend = KindBackend::new();
    for kind in [HeapKind::System, HeapKind::SystemContig, HeapKind::Carveout] {
        backend.register(kind, CountingFactory { live: live.clone() });
    }

    let config = HeapPoolConfig::new(vec![
        HeapDescriptor::new(0, HeapKind::System, "system-heap"),
        HeapDescriptor::new(1, HeapKind::SystemContig, "system-contig-heap"),
        HeapDescriptor::new(2, HeapKind::Carveout, "carveout")
            .with_size(SZ_4M)
            .with_base(0x8000_0000),
        HeapDescriptor::new(3, HeapKind::Chunk, "chunk")
            .with_size(SZ_4M)
            .with_align(SZ_16K)
            .with_base(0x8040_0000),
    ])
    .unwrap();

    // No chunk strategy: bring-up fails on heap 3 and unwinds the other three
    let mut driver = IonDriver::new(KindPlatform { backend }, config);
    assert_eq!(
        driver.attach(),
        Err(IonError::BackendCreateFailed {
            descriptor_id: 3,
            underlying: BackendError::Unsupported(HeapKind::Chunk),
        })
    );
    assert_eq!(live.load(Ordering::SeqCst), 0);
    driver.detach();

    // With the chunk strategy installed everything comes up
    driver
        .platform_mut()
        .backend
        .register(HeapKind::Chunk, CountingFactory { live: live.clone() });
    driver.attach().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 4);
    assert_eq!(driver.state(), LifecycleState::PoolLive);

    let pool = driver.context().pool().unwrap();
    assert_eq!(pool.get(3).unwrap().handle().kind(), HeapKind::Chunk);

    driver.detach();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}
