//! The decoded request record and the queue-class tag it is classified
//! into.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::dispatch::xprt::XprtHandle;
use crate::protocol::rpc::Context;
use crate::protocol::xdr::rpc::call_body;

/// Where a worker sends the encoded reply for a dequeued `Req`.
///
/// `XprtHandle` has no live socket of its own (a datagram transport is
/// shared across every peer that ever talks to it), so the reply path
/// travels with the `Req` instead.
pub enum ReplySink {
    /// A connection-oriented transport: replies go back down the same
    /// ordered byte stream the request arrived on. Bounded by
    /// `rpc.ioq_thrd_max` (§6) so a stalled reader applies backpressure all
    /// the way back to the worker instead of growing without bound.
    Stream(mpsc::Sender<Vec<u8>>),
    /// A datagram transport: replies must be addressed back to the peer
    /// that sent this particular message.
    Datagram { socket: Arc<UdpSocket>, peer: SocketAddr },
    /// No reply is expected or possible (unit tests, internally
    /// manufactured `Req`s). Silently drops the encoded reply.
    Discard,
}

impl ReplySink {
    /// Delivers an encoded reply. Errors are reported to the caller but
    /// never panic: a peer that has gone away by the time a reply is ready
    /// is an ordinary, expected occurrence.
    pub async fn send(&self, buf: Vec<u8>) -> anyhow::Result<()> {
        match self {
            ReplySink::Stream(tx) => {
                tx.send(buf).await.map_err(|_| anyhow::anyhow!("reply stream closed"))
            }
            ReplySink::Datagram { socket, peer } => {
                socket.send_to(&buf, peer).await?;
                Ok(())
            }
            ReplySink::Discard => Ok(()),
        }
    }
}

/// Destination queue for a decoded request. See `dispatch::classify`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QClass {
    /// MOUNT protocol calls.
    Mount,
    /// Server-internal callback requests (not produced by this crate's
    /// transports today, but retained as a distinct class so a future
    /// internal caller has somewhere to route low-latency control calls
    /// without contending with client traffic).
    Call,
    /// Ordinary NFS calls expected to complete quickly (metadata reads).
    LowLatency,
    /// NFS calls expected to block on storage (writes, creates, removes).
    HighLatency,
}

impl QClass {
    /// All four classes, in the fixed slot order used by the round-robin
    /// dequeue rotation.
    pub const ALL: [QClass; 4] =
        [QClass::Mount, QClass::Call, QClass::LowLatency, QClass::HighLatency];

    /// The fixed slot index for this class, used to compute `next_slot() % 4`.
    pub fn slot(self) -> usize {
        match self {
            QClass::Mount => 0,
            QClass::Call => 1,
            QClass::LowLatency => 2,
            QClass::HighLatency => 3,
        }
    }
}

/// Bitset summarizing request character, extracted during decode and
/// consumed only by `classify`. Named `Lookahead` after the original's
/// lookahead bits.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Lookahead {
    pub mount: bool,
    pub high_latency: bool,
}

/// Marker for requests that originate from inside the server rather than
/// from a decoded client transmission. This crate never manufactures these
/// today; the variant exists so `classify` has a total, spec-faithful input
/// domain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReqKind {
    Call,
    Decoded(Lookahead),
}

/// A decoded, classified RPC request waiting on (or moving through) a
/// `QClass` queue.
///
/// Carries the transport handle (kept alive by the handle's own refcount
/// for the lifetime of this record), the decoded call header, the raw
/// argument bytes still to be consumed by the protocol handler, the
/// classification lookahead, and the enqueue timestamp used to preserve
/// FIFO order within a class.
pub struct Req {
    pub xprt: XprtHandle,
    pub xid: u32,
    pub call: call_body,
    pub body: Vec<u8>,
    pub lookahead: Lookahead,
    pub class: QClass,
    pub enqueued_at: Instant,
    pub context: Context,
    pub reply: ReplySink,
}

impl Req {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        xprt: XprtHandle,
        xid: u32,
        call: call_body,
        body: Vec<u8>,
        lookahead: Lookahead,
        class: QClass,
        context: Context,
        reply: ReplySink,
    ) -> Self {
        Self {
            xprt,
            xid,
            call,
            body,
            lookahead,
            class,
            enqueued_at: Instant::now(),
            context,
            reply,
        }
    }
}
