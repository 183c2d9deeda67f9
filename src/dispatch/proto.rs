//! Protocol tags multiplexed by a single dispatcher instance.
//!
//! Mirrors the `protos`/`tags[]` table in the original NFS dispatcher: each
//! tag owns up to two listening sockets (UDP and TCP) and carries the RPC
//! program number used to route a decoded call to its handler.

use crate::protocol::xdr::{mount, nfs3, portmap};

/// A protocol this dispatcher is willing to accept connections for.
///
/// `Nfs`, `Mount` and `Portmap` are backed by handlers already present in
/// `protocol::nfs`. `Nlm` and `Rquota` are recognized as program numbers for
/// routing purposes but have no registered handler in this crate; calls
/// routed to them receive `PROG_UNAVAIL` like any other unknown program.
/// `NfsVsock`/`NfsRdma` are the same NFS program carried over an alternate
/// transport rather than distinct programs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Proto {
    Nfs,
    Mount,
    Nlm,
    Rquota,
    NfsVsock,
    NfsRdma,
}

/// RPC program number for the Network Lock Manager protocol.
pub const NLM_PROGRAM: u32 = 100021;
/// RPC program number for the Remote Quota protocol.
pub const RQUOTA_PROGRAM: u32 = 100011;

impl Proto {
    /// The RPC program number this protocol tag is registered under.
    pub fn program(self) -> u32 {
        match self {
            Proto::Nfs | Proto::NfsVsock | Proto::NfsRdma => nfs3::PROGRAM,
            Proto::Mount => mount::PROGRAM,
            Proto::Nlm => NLM_PROGRAM,
            Proto::Rquota => RQUOTA_PROGRAM,
        }
    }

    /// The RPC program version this protocol tag is registered under.
    ///
    /// NLM and RQUOTA have no procedure handler in this crate; their version
    /// numbers are the RFC-conventional ones so portmap registration is
    /// still accurate for callers that run their own NLM/RQUOTA service
    /// behind the same registrar.
    pub fn version(self) -> u32 {
        match self {
            Proto::Nfs | Proto::NfsVsock | Proto::NfsRdma => nfs3::VERSION,
            Proto::Mount => mount::VERSION,
            Proto::Nlm => 4,
            Proto::Rquota => 2,
        }
    }

    /// Whether this tag supports a connectionless (UDP) transport.
    ///
    /// VSOCK and RDMA variants are stream-only.
    pub fn supports_datagram(self) -> bool {
        !matches!(self, Proto::NfsVsock | Proto::NfsRdma)
    }

    /// Resolves the program number carried in an RPC call to a `Proto`, when
    /// it is one this dispatcher recognizes by program number alone (i.e.
    /// excluding the transport-distinguished NFS variants, which are
    /// resolved by the listening socket they arrived on instead).
    pub fn from_program(prog: u32) -> Option<Proto> {
        match prog {
            p if p == nfs3::PROGRAM => Some(Proto::Nfs),
            p if p == mount::PROGRAM => Some(Proto::Mount),
            p if p == portmap::PROGRAM => None, // portmap is handled separately, not a Proto
            NLM_PROGRAM => Some(Proto::Nlm),
            RQUOTA_PROGRAM => Some(Proto::Rquota),
            _ => None,
        }
    }
}
