//! Common test utilities for integration tests.
//!
//! Everything runs on an in-process [`LoopbackBus`], so no privileges or
//! kernel modules are needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use genlbus::bus::{FamilyRegistry, Name, NameAllocator};
use genlbus::netlink::Transport;
use genlbus::netlink::genl::{FamilySpec, Registered, Registrar};
use genlbus::netlink::loopback::{LoopbackBus, LoopbackSocket};
use genlbus::{Error, Result};

/// Name allocator that counts live names and can be told to fail.
#[derive(Clone, Default)]
pub struct TrackingNames {
    live: Arc<AtomicUsize>,
    allocated: Arc<AtomicUsize>,
    fail_on: Option<usize>,
}

struct Lease(Arc<AtomicUsize>);

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TrackingNames {
    /// Make the `n`-th allocation (1-based) fail with `ResourceExhausted`.
    pub fn failing_on(n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::default()
        }
    }

    /// Names allocated and not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total allocation attempts.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }
}

impl NameAllocator for TrackingNames {
    fn allocate(&self, text: String) -> Result<Name> {
        let n = self.allocated.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(n) {
            return Err(Error::ResourceExhausted(format!("name {text}")));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Name::with_lease(text, Lease(self.live.clone())))
    }
}

/// Registrar that rejects one family name with `EIO` and forwards the rest.
#[derive(Clone)]
pub struct FailingRegistrar {
    bus: LoopbackBus,
    reject: &'static str,
    unregistered: Arc<AtomicUsize>,
}

impl FailingRegistrar {
    pub fn new(bus: LoopbackBus, reject: &'static str) -> Self {
        Self {
            bus,
            reject,
            unregistered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many families were unregistered through this registrar.
    pub fn unregistered(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }
}

impl Registrar for FailingRegistrar {
    fn register_family(&self, spec: &FamilySpec<'_>) -> Result<Registered> {
        if spec.name == self.reject {
            return Err(Error::from_errno(-libc::EIO));
        }
        self.bus.register_family(spec)
    }

    fn unregister_family(&self, id: u16) -> Result<()> {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
        self.bus.unregister_family(id)
    }

    fn multicast(&self, group_id: u32, msg: &[u8]) -> Result<usize> {
        self.bus.multicast(group_id, msg)
    }
}

/// Loopback socket whose `n`-th group join (1-based) fails with `ENOBUFS`.
pub struct FailingJoins {
    inner: LoopbackSocket,
    joins: usize,
    fail_on: usize,
}

impl FailingJoins {
    pub fn new(inner: LoopbackSocket, fail_on: usize) -> Self {
        Self {
            inner,
            joins: 0,
            fail_on,
        }
    }
}

impl Transport for FailingJoins {
    fn pid(&self) -> u32 {
        self.inner.pid()
    }

    fn next_seq(&self) -> u32 {
        self.inner.next_seq()
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        self.joins += 1;
        if self.joins == self.fail_on {
            return Err(Error::from_errno(-libc::ENOBUFS));
        }
        self.inner.add_membership(group)
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        self.inner.send(msg).await
    }

    async fn recv_msg(&self) -> Result<Vec<u8>> {
        self.inner.recv_msg().await
    }
}

/// A loopback bus with every bus family registered.
pub fn producer() -> Result<(LoopbackBus, FamilyRegistry<LoopbackBus>)> {
    let bus = LoopbackBus::new();
    let mut registry = FamilyRegistry::new(bus.clone());
    registry.register_all()?;
    Ok((bus, registry))
}
