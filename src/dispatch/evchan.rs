//! The Event-Channel Pool: a fixed set of demultiplexer "threads" (realized
//! here as tokio tasks, one per channel) that transports are bound to for
//! their lifetime.
//!
//! A channel in the original is an epoll thread; under tokio each channel is
//! instead an owner of a registration queue and a `shutdown` signal. The
//! actual polling for readiness is done by the per-connection task spawned
//! in `tcp.rs`/`dispatch::lifecycle` — what this module provides is the
//! fixed-size, round-robin *assignment* of connections to channels and the
//! coordinated `SHUTDOWN` broadcast the Lifecycle Controller sends at
//! teardown, matching §4.4 and §4.8 of the design this crate implements.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A broadcastable, idempotent shutdown flag paired with a `Notify` so
/// tasks parked on `token.cancelled()` wake promptly instead of polling.
#[derive(Clone)]
pub struct ShutdownToken(Arc<(AtomicBool, Notify)>);

impl ShutdownToken {
    fn new() -> Self {
        Self(Arc::new((AtomicBool::new(false), Notify::new())))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0 .0.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.0 .0.store(true, Ordering::SeqCst);
        self.0 .1.notify_waiters();
    }

    /// Resolves once `cancel()` has been called. Safe to await repeatedly
    /// and from multiple tasks (mirrors `CancellationToken::cancelled`).
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.0 .1.notified().await;
    }
}

/// Reserved channels beyond the three worker channels: one for UDP
/// ingestion, one for TCP accept, and (when enabled) one for RDMA accept.
pub const EVCHAN_SIZE: usize = 3;

/// Fixed number of worker channels that host accepted TCP connections.
pub const N_WORKER_CHAN: usize = 3;

/// Opaque identifier for an event channel. A transport belongs to exactly
/// one channel for its lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EvChan(pub usize);

/// Reserved (non-worker) channel roles.
impl EvChan {
    pub const UDP_UREG: EvChan = EvChan(N_WORKER_CHAN);
    pub const TCP_UREG: EvChan = EvChan(N_WORKER_CHAN + 1);
    pub const RDMA_UREG: EvChan = EvChan(N_WORKER_CHAN + 2);
}

/// Owns the channel-assignment counter and the shared shutdown token handed
/// to every channel-bound task.
pub struct EventChannelPool {
    next_worker_chan: AtomicUsize,
    shutdown: ShutdownToken,
}

impl Default for EventChannelPool {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannelPool {
    pub fn new() -> Self {
        Self { next_worker_chan: AtomicUsize::new(0), shutdown: ShutdownToken::new() }
    }

    /// Assigns the next worker channel to an accepted connection, rotating
    /// round-robin across the `N_WORKER_CHAN` worker channels.
    pub fn assign_worker_channel(&self) -> EvChan {
        let slot = self.next_worker_chan.fetch_add(1, Ordering::Relaxed) % N_WORKER_CHAN;
        EvChan(slot)
    }

    /// A clone of the shutdown token; channel-bound tasks select on
    /// `token.cancelled()` alongside their I/O readiness future so a
    /// `SHUTDOWN` broadcast unblocks every channel promptly.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Broadcasts `SHUTDOWN` to every channel bound to this pool's token.
    pub fn shutdown_all(&self) {
        self.shutdown.cancel();
    }
}

pub type SharedEventChannelPool = Arc<EventChannelPool>;
