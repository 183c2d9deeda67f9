//! The Portmap Registrar: register/unregister `(program, version)` tuples
//! against a rpcbind-equivalent service (§4.2).
//!
//! This crate implements the portmap *protocol* itself in
//! `protocol::nfs::portmap` (for inbound GETPORT/SET/UNSET/DUMP queries from
//! clients) but has no client for an *external* rpcbind daemon — that would
//! be a genuinely external dependency with no crate in this workspace's
//! stack to reach for. `LocalRegistrar` resolves this by registering into
//! the same in-process `PortmapTable` this server already answers queries
//! from, which is a faithful local rpcbind for a server that is also acting
//! as its own portmapper. Callers embedding this crate in an environment
//! with a real system rpcbind can supply their own `PortmapRegistrar`.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::dispatch::error::DispatchError;
use crate::protocol::nfs::portmap::{PortmapKey, PortmapTable};
use crate::protocol::xdr::portmap::{IPPROTO_TCP, IPPROTO_UDP};

/// One netconfig entry a program/version is registered against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Netconfig {
    Udpv4,
    Udpv6,
    Tcpv4,
    Tcpv6,
}

impl Netconfig {
    fn protocol(self) -> u32 {
        match self {
            Netconfig::Udpv4 | Netconfig::Udpv6 => IPPROTO_UDP,
            Netconfig::Tcpv4 | Netconfig::Tcpv6 => IPPROTO_TCP,
        }
    }

    fn is_ipv6(self) -> bool {
        matches!(self, Netconfig::Udpv6 | Netconfig::Tcpv6)
    }
}

/// Registers and unregisters `(program, version)` tuples with a
/// portmapper. Implementations decide what "netconfig missing" and
/// registration failure mean for their backend; §6 requires a missing IPv4
/// netconfig to be fatal and a missing IPv6 netconfig to be merely
/// informational, which `register_program` below enforces regardless of
/// backend by treating IPv6 entries as best-effort.
pub trait PortmapRegistrar: Send + Sync {
    fn register(
        &self,
        program: u32,
        version: u32,
        port: u16,
        netconfig: Netconfig,
    ) -> Result<(), DispatchError>;

    fn unregister(&self, program: u32, version: u32);
}

/// No-op registrar for builds without portmapper support (§4.2: "a no-op
/// when the core is built without portmapper support").
#[derive(Default)]
pub struct NullRegistrar;

impl PortmapRegistrar for NullRegistrar {
    fn register(
        &self,
        _program: u32,
        _version: u32,
        _port: u16,
        _netconfig: Netconfig,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    fn unregister(&self, _program: u32, _version: u32) {}
}

/// Registers into this process's own `PortmapTable` — the table
/// `protocol::nfs::portmap::handle_portmap` already answers GETPORT/DUMP
/// queries from.
pub struct LocalRegistrar {
    table: Arc<RwLock<PortmapTable>>,
}

impl LocalRegistrar {
    pub fn new(table: Arc<RwLock<PortmapTable>>) -> Self {
        Self { table }
    }
}

impl PortmapRegistrar for LocalRegistrar {
    fn register(
        &self,
        program: u32,
        version: u32,
        port: u16,
        netconfig: Netconfig,
    ) -> Result<(), DispatchError> {
        let key = PortmapKey { prog: program, vers: version, prot: netconfig.protocol() };
        let mut table = self.table.write().expect("portmap table lock poisoned");
        table.table.insert(key, port);
        Ok(())
    }

    fn unregister(&self, program: u32, version: u32) {
        let mut table = self.table.write().expect("portmap table lock poisoned");
        for prot in [IPPROTO_TCP, IPPROTO_UDP] {
            table.table.remove(&PortmapKey { prog: program, vers: version, prot });
        }
    }
}

/// Registers `(program, version)` against all four netconfigs, per §6: a
/// missing/failed IPv4 registration is fatal, a missing/failed IPv6
/// registration is logged and ignored.
pub fn register_program(
    registrar: &dyn PortmapRegistrar,
    program: u32,
    version: u32,
    port: u16,
) -> Result<(), DispatchError> {
    for nc in [Netconfig::Udpv4, Netconfig::Tcpv4] {
        registrar.register(program, version, port, nc).map_err(|_| {
            DispatchError::PortmapRegister {
                program,
                version,
                reason: format!("{nc:?} registration failed"),
            }
        })?;
    }
    for nc in [Netconfig::Udpv6, Netconfig::Tcpv6] {
        if let Err(e) = registrar.register(program, version, port, nc) {
            warn!(program, version, ?nc, error = %e, "IPv6 portmap registration skipped");
        }
    }
    info!(program, version, port, "registered with portmapper");
    Ok(())
}

/// Best-effort unregistration of `(program, version)` across all
/// netconfigs; failures during shutdown are ignored per §4.2.
pub fn unregister_program(registrar: &dyn PortmapRegistrar, program: u32, version: u32) {
    registrar.unregister(program, version);
}
