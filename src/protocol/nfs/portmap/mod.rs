//! PORTMAP protocol implementation as specified in RFC 1057 A.1 and A.2 sections.
//! https://datatracker.ietf.org/doc/rfc1057/

use std::collections::HashMap;
use std::io::{Read, Write};

use num_traits::cast::FromPrimitive;
use tracing::error;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, portmap, Serialize};

mod dump;
mod get_port;
mod null;
mod set_port;
mod unset_port;

use dump::pmapproc_dump;
use get_port::pmapproc_getport;
use null::pmapproc_null;
use set_port::pmapproc_setport;
use unset_port::pmapproc_unsetport;

/// Key identifying one registered (program, version, protocol) tuple.
///
/// `prot` is an `IPPROTO_TCP`/`IPPROTO_UDP` value rather than a richer
/// netconfig type: this table only ever serves this process's own clients,
/// which only distinguish TCP from UDP, not IPv4 from IPv6.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PortmapKey {
    pub prog: u32,
    pub vers: u32,
    pub prot: u32,
}

/// The in-process portmap registration table. `PMAPPROC_GETPORT`/`DUMP`
/// read it, `PMAPPROC_SET`/`UNSET` and `dispatch::portmap_registrar`'s
/// `LocalRegistrar` write it — this server acts as its own rpcbind.
#[derive(Debug, Default)]
pub struct PortmapTable {
    pub table: HashMap<PortmapKey, u16>,
}

/// Main handler for PORTMAP protocol
///
/// PMAPPROC_CALLIT (forwarding a call to another RPC service) is not
/// implemented: this server has no need to proxy calls to itself.
///
/// # Arguments
///
/// * `xid` - RPC transaction ID from the client
/// * `call` - The RPC call body containing program, version, and procedure numbers
/// * `input` - Input stream for reading procedure arguments
/// * `output` - Output stream for writing procedure results
/// * `context` - Server context containing port information
///
/// # Returns
///
/// * `Result<(), anyhow::Error>` - Ok(()) on success or an error
pub fn handle_portmap(
    xid: u32,
    call: &xdr::rpc::call_body,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &mut rpc::Context,
) -> Result<(), anyhow::Error> {
    if call.vers != portmap::VERSION {
        error!("Invalid Portmap Version number {} != {}", call.vers, portmap::VERSION);
        xdr::rpc::prog_mismatch_reply_message(xid, portmap::VERSION).serialize(output)?;
        return Ok(());
    }
    let prog =
        portmap::PortmapProgram::from_u32(call.proc).unwrap_or(portmap::PortmapProgram::INVALID);

    match prog {
        portmap::PortmapProgram::PMAPPROC_NULL => pmapproc_null(xid, input, output)?,
        portmap::PortmapProgram::PMAPPROC_GETPORT => pmapproc_getport(xid, input, output, context)?,
        portmap::PortmapProgram::PMAPPROC_SET => pmapproc_setport(xid, input, output, context)?,
        portmap::PortmapProgram::PMAPPROC_UNSET => pmapproc_unsetport(xid, input, output, context)?,
        portmap::PortmapProgram::PMAPPROC_DUMP => pmapproc_dump(xid, output, context)?,
        _ => {
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
        }
    }
    Ok(())
}
