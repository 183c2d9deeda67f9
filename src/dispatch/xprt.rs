//! The polymorphic, reference-counted transport handle (`Xprt` in the
//! original) and its monotone lifecycle state machine.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::dispatch::evchan::EvChan;

/// Transport lifecycle state. Transitions are monotone toward `Destroyed`:
/// `Idle -> Dispatch -> Died -> Destroyed`. `Died` is a recoverable report
/// (the connection is gone but bookkeeping may still run); `Destroyed` is
/// terminal and frees private state exactly once.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum XprtStat {
    Idle = 0,
    Dispatch = 1,
    Died = 2,
    Destroyed = 3,
}

impl XprtStat {
    fn from_u8(v: u8) -> XprtStat {
        match v {
            0 => XprtStat::Idle,
            1 => XprtStat::Dispatch,
            2 => XprtStat::Died,
            _ => XprtStat::Destroyed,
        }
    }
}

/// Which concrete transport kind this handle wraps.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransportKind {
    Datagram,
    StreamListener,
    StreamConnection,
    RdmaListener,
    RdmaConnection,
}

/// Per-transport private state (`u1` in the original). Opaque to the
/// dispatcher core; protocol handlers may stash connection-scoped state
/// here in the future. Empty today because no handler needs it yet.
#[derive(Default)]
pub struct XprtPrivate;

/// The DRC binding slot (`u2`), allocated lazily on a transport's first
/// request. The duplicate-request cache itself lives in `protocol::nfs`
/// (out of scope here); this slot only tracks *whether* a binding exists so
/// destruction can release it exactly once.
#[derive(Default)]
pub struct DrcBinding;

struct XprtInner {
    kind: TransportKind,
    peer: Option<SocketAddr>,
    local_port: u16,
    refcount: AtomicU32,
    stat: AtomicU8,
    channel: Mutex<Option<EvChan>>,
    private: Mutex<XprtPrivate>,
    drc: Mutex<Option<DrcBinding>>,
}

/// A cheaply-cloneable, reference-counted handle to a transport.
///
/// Cloning increments the shared refcount; dropping decrements it. The
/// refcount never drives teardown by itself in this in-memory design (tokio
/// already frees the underlying socket when the owning task exits) but is
/// kept accurate so invariants about "a transport's refcount is >= 1 while
/// any pending `Req` references it" can be asserted in tests.
#[derive(Clone)]
pub struct XprtHandle(Arc<XprtInner>);

impl XprtHandle {
    pub fn new(kind: TransportKind, peer: Option<SocketAddr>, local_port: u16) -> Self {
        Self(Arc::new(XprtInner {
            kind,
            peer,
            local_port,
            refcount: AtomicU32::new(1),
            stat: AtomicU8::new(XprtStat::Idle as u8),
            channel: Mutex::new(None),
            private: Mutex::new(XprtPrivate),
            drc: Mutex::new(None),
        }))
    }

    pub fn kind(&self) -> TransportKind {
        self.0.kind
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.0.peer
    }

    pub fn local_port(&self) -> u16 {
        self.0.local_port
    }

    /// Current reference count. A count of 1 means this handle is the only
    /// owner; `Req`s referencing a transport hold their own clone for the
    /// duration of their processing.
    pub fn refcount(&self) -> u32 {
        self.0.refcount.load(Ordering::SeqCst)
    }

    /// Acquires an additional reference, e.g. when a `Req` is allocated
    /// against this transport.
    pub fn acquire(&self) -> XprtHandle {
        self.0.refcount.fetch_add(1, Ordering::SeqCst);
        XprtHandle(self.0.clone())
    }

    /// Releases a reference previously taken with `acquire`. Call exactly
    /// once per `acquire`, typically when a `Req` referencing this
    /// transport is freed.
    pub fn release(&self) {
        self.0.refcount.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn stat(&self) -> XprtStat {
        XprtStat::from_u8(self.0.stat.load(Ordering::SeqCst))
    }

    /// Moves the transport's state forward. Silently ignores attempts to
    /// move backward (e.g. `Died` after `Destroyed`), preserving the
    /// monotone-toward-`Destroyed` invariant.
    pub fn set_stat(&self, next: XprtStat) {
        let cur = self.stat();
        if (next as u8) >= (cur as u8) {
            self.0.stat.store(next as u8, Ordering::SeqCst);
        }
        if next == XprtStat::Destroyed {
            self.destroy();
        }
    }

    /// Records which event channel owns this transport. A transport is
    /// registered with exactly one channel for its lifetime; calling this
    /// twice with a different channel is a bug in the caller.
    pub fn bind_channel(&self, chan: EvChan) {
        *self.0.channel.lock().expect("xprt channel lock poisoned") = Some(chan);
    }

    pub fn channel(&self) -> Option<EvChan> {
        *self.0.channel.lock().expect("xprt channel lock poisoned")
    }

    /// Lazily binds a DRC slot on first request. Returns `true` if this call
    /// performed the allocation, `false` if one already existed.
    pub fn bind_drc_if_absent(&self) -> bool {
        let mut slot = self.0.drc.lock().expect("xprt drc lock poisoned");
        if slot.is_none() {
            *slot = Some(DrcBinding);
            true
        } else {
            false
        }
    }

    /// Releases `u1`/`u2` on destruction. Idempotent: a second call is a
    /// no-op since the slot is already `None`.
    fn destroy(&self) {
        *self.0.private.lock().expect("xprt private lock poisoned") = XprtPrivate;
        self.0.drc.lock().expect("xprt drc lock poisoned").take();
    }
}
