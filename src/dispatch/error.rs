//! Structured error taxonomy for the dispatcher's startup and lifecycle
//! paths. Per-request errors continue to flow through `anyhow::Error` as in
//! the rest of the `protocol` module; this type exists so callers driving
//! `Dispatcher::start` can match on *kind* instead of parsing a message.

use std::io;

use thiserror::Error;

/// A startup or lifecycle failure, tagged by the policy it implies.
///
/// `Fatal` kinds should terminate the process after being logged; `NonFatal`
/// kinds should be logged at `warn!` and startup should continue degraded.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Socket allocation failed on every attempted address family.
    #[error("failed to allocate {proto:?} socket: {source}")]
    SocketAllocation {
        proto: crate::dispatch::proto::Proto,
        #[source]
        source: io::Error,
    },

    /// Bind to a required port failed.
    #[error("failed to bind {proto:?} on port {port}: {source}")]
    BindFailed {
        proto: crate::dispatch::proto::Proto,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A required (IPv4) netconfig entry could not be resolved for portmap
    /// registration.
    #[error("required netconfig missing for {0}")]
    NetconfigMissing(&'static str),

    /// Portmapper registration failed for a (program, version) tuple.
    #[error("portmap registration failed for program {program} version {version}: {reason}")]
    PortmapRegister { program: u32, version: u32, reason: String },

    /// VSOCK bind failed; logged and treated as non-fatal by callers.
    #[error("VSOCK bind failed: {0}")]
    VsockBindFailed(io::Error),

    /// An IPv6 netconfig entry was not present; informational only.
    #[error("IPv6 netconfig missing for {0}")]
    Ipv6NetconfigMissing(&'static str),

    /// GSS credential acquisition failed; server continues without GSS.
    #[error("GSS credential acquisition failed: {0}")]
    GssCredentialFailed(String),
}

impl DispatchError {
    /// True if this error kind should terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::SocketAllocation { .. }
                | DispatchError::BindFailed { .. }
                | DispatchError::NetconfigMissing(_)
                | DispatchError::PortmapRegister { .. }
        )
    }
}
