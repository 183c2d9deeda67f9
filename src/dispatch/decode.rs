//! The Decode Pipeline (spec.md §4.5): turns a raw RPC record into a
//! classified, enqueued `Req`, or disposes of it inline (an RPC-level error
//! reply, or a dropped GSS handshake frame).
//!
//! This runs on the event-channel task that owns the transport, mirroring
//! the original's "single entry point `decode_request(xprt, xdrs)`" — here
//! split into `decode_request` (header parse, auth, classify, enqueue) and
//! `dispatch_req` (the worker-side half that invokes the protocol handler
//! once a `Req` has been dequeued).
//!
//! `Req` allocation and freeing correspond to the original's `pool_alloc`/
//! `pool_free`; spec.md §6 declares the `Req` pool an external collaborator,
//! so this pipeline uses ordinary heap allocation rather than inventing a
//! pooling scheme of its own.

use std::io::Cursor;

use tracing::warn;

use crate::dispatch::classify::{classify, lookahead_for_nfs3};
use crate::dispatch::queue::GlobalQueueSet;
use crate::dispatch::req::{Lookahead, ReplySink, Req, ReqKind};
use crate::dispatch::xprt::XprtHandle;
use crate::protocol::nfs;
use crate::protocol::rpc::Context;
use crate::protocol::xdr::rpc::{
    auth_error_reply_message, auth_flavor, auth_stat, call_body, rpc_body, rpc_msg,
};
use crate::protocol::xdr::{self, deserialize, mount, nfs3, portmap, Serialize};

/// Replacement for the original's `no_dispatch` boolean (§9 REDESIGN
/// FLAGS): the total outcome of `svc_auth_authenticate` as a named enum
/// rather than an auth status plus a side-channel flag.
#[derive(Copy, Clone, Debug)]
pub enum AuthOutcome {
    /// Authenticated; proceed to classification and enqueue.
    Dispatch,
    /// A security-handshake message was consumed; the caller should
    /// neither reply nor enqueue, just let the transport keep reading.
    ///
    /// This crate's `auth_flavor` has no RPCSEC_GSS variant (§1 Non-goals:
    /// "authentication algorithms" stops at AUTH_UNIX framing), so XDR
    /// decode of a GSS-flavored credential fails before `authenticate` ever
    /// runs and this variant is structurally unreachable today. It is kept
    /// so a future RPCSEC_GSS credential decoder has a home to route into
    /// without re-threading the auth outcome type.
    Handshake,
    /// Authentication failed; the caller should reply with `svcerr_auth`
    /// carrying this status and not enqueue.
    Reject(auth_stat),
}

/// Authenticates a decoded call header. Only `AUTH_NULL` (anonymous) and
/// `AUTH_UNIX` credentials are understood by this crate; anything else is
/// rejected rather than silently accepted.
fn authenticate(call: &call_body) -> AuthOutcome {
    match call.cred.flavor {
        auth_flavor::AUTH_NULL | auth_flavor::AUTH_UNIX => AuthOutcome::Dispatch,
        _ => AuthOutcome::Reject(auth_stat::AUTH_REJECTEDCRED),
    }
}

fn encode_reply(msg: rpc_msg) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    msg.serialize(&mut buf)?;
    Ok(buf)
}

/// What became of one raw RPC record handed to the pipeline.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Classified and handed to a `GlobalQueueSet`; a worker will dispatch
    /// it and send the reply.
    Enqueued,
    /// The pipeline itself produced and sent an RPC-level reply
    /// (`svcerr_auth`, RPC version mismatch); nothing was enqueued.
    Replied,
    /// Consumed with no reply and no enqueue (malformed header, or a
    /// handshake frame per `AuthOutcome::Handshake`).
    Dropped,
}

/// Runs the Decode Pipeline over one raw RPC record (a UDP datagram, or one
/// reassembled TCP record-marked fragment) arriving on `xprt`.
///
/// Steps, matching spec.md §4.5:
/// 1. Acquire a reference on `xprt` for the `Req` about to be built.
/// 2. Parse the RPC header (`SVC_DECODE`); a malformed header cannot even
///    carry a reply address, so it is dropped rather than answered.
/// 3. Reject RPC versions other than 2.
/// 4. Authenticate; a handshake frame is dropped, a rejection is answered
///    inline, and a successful authentication proceeds to classification.
/// 5. The per-procedure argument decode (`funcdesc`'s XDR decoder) is left
///    to the worker side (`dispatch_req`): this codebase's protocol
///    handlers decode their own arguments from the remaining body bytes,
///    so the pipeline only needs to preserve those bytes un-decoded.
/// 6/7. Classify, enqueue, and release the pipeline's own `Req` reference
///    (the queue now holds the second reference until a worker dequeues).
pub async fn decode_request(
    xprt: XprtHandle,
    raw: &[u8],
    mut context: Context,
    reply: ReplySink,
    queues: &GlobalQueueSet,
) -> anyhow::Result<DecodeOutcome> {
    let xprt_ref = xprt.acquire();

    let mut cursor = Cursor::new(raw);
    let msg: rpc_msg = match deserialize(&mut cursor) {
        Ok(m) => m,
        Err(e) => {
            xprt_ref.release();
            warn!(error = %e, "failed to decode RPC message header");
            return Ok(DecodeOutcome::Dropped);
        }
    };
    let xid = msg.xid;
    let call = match msg.body {
        rpc_body::CALL(c) => c,
        rpc_body::REPLY(_) => {
            xprt_ref.release();
            anyhow::bail!("received an RPC reply where a call was expected");
        }
    };

    if call.rpcvers != 2 {
        xprt_ref.release();
        warn!(rpcvers = call.rpcvers, "rejecting unsupported RPC version");
        reply.send(encode_reply(xdr::rpc::rpc_vers_mismatch(xid))?).await?;
        return Ok(DecodeOutcome::Replied);
    }

    match authenticate(&call) {
        AuthOutcome::Reject(stat) => {
            xprt_ref.release();
            reply.send(encode_reply(auth_error_reply_message(xid, stat))?).await?;
            return Ok(DecodeOutcome::Replied);
        }
        AuthOutcome::Handshake => {
            xprt_ref.release();
            return Ok(DecodeOutcome::Dropped);
        }
        AuthOutcome::Dispatch => {}
    }

    if let auth_flavor::AUTH_UNIX = call.cred.flavor {
        context.auth = deserialize(&mut Cursor::new(&call.cred.body))?;
    }

    let is_mount = call.prog == mount::PROGRAM;
    let lookahead = if call.prog == nfs3::PROGRAM {
        lookahead_for_nfs3(call.proc, is_mount)
    } else {
        Lookahead { mount: is_mount, high_latency: false }
    };
    let class = classify(ReqKind::Decoded(lookahead));

    // §4.3: the DRC slot is lazily allocated on a transport's first request.
    xprt_ref.bind_drc_if_absent();

    let body = raw[cursor.position() as usize..].to_vec();
    let req = Req::new(xprt_ref, xid, call, body, lookahead, class, context, reply);
    queues.enqueue(req);
    Ok(DecodeOutcome::Enqueued)
}

/// The worker-side half of the pipeline: invoked once a `Req` is dequeued,
/// this decodes the per-procedure arguments (inside the matched handler),
/// runs the registered `valid_NFS`/`valid_MNT`/PORTMAP handler, and sends
/// the encoded reply. Mirrors `protocol::rpc::wire::handle_rpc`'s dispatch
/// half, operating on an already-classified `Req` instead of a live stream.
///
/// `NLM`/`RQUOTA` program numbers are recognized by `dispatch::proto` for
/// transport and portmap-registration purposes but have no handler in this
/// crate (spec.md §1: out of scope); calls against them fall through to the
/// same `PROG_UNAVAIL` reply any other unregistered program gets.
pub async fn dispatch_req(req: Req) -> anyhow::Result<()> {
    let Req { xprt, xid, call, body, context, reply, .. } = req;

    if context.transaction_tracker.is_retransmission(xid, &context.client_addr) {
        xprt.release();
        return Ok(());
    }

    let mut input = Cursor::new(body);
    let mut output = Vec::new();
    let mut handler_context = context.clone();

    let result = match call.prog {
        nfs3::PROGRAM => nfs::v3::handle_nfs(xid, call.clone(), &mut input, &mut output, &context).await,
        mount::PROGRAM => {
            nfs::mount::handle_mount(xid, call.clone(), &mut input, &mut output, &context).await
        }
        portmap::PROGRAM => {
            nfs::portmap::handle_portmap(xid, &call, &mut input, &mut output, &mut handler_context)
        }
        _ => {
            xdr::rpc::prog_unavail_reply_message(xid).serialize(&mut output)?;
            Ok(())
        }
    };

    context.transaction_tracker.mark_processed(xid, &context.client_addr);
    xprt.release();
    result?;

    if !output.is_empty() {
        reply.send(output).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::xprt::TransportKind;
    use crate::protocol::nfs::portmap::PortmapTable;
    use crate::protocol::rpc::TransactionTracker;
    use crate::protocol::xdr::rpc::{auth_unix, opaque_auth, reply_body};
    use crate::vfs::NFSFileSystem;
    use std::sync::{Arc, RwLock};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct NoopFs;
    #[async_trait::async_trait]
    impl NFSFileSystem for NoopFs {
        fn generation(&self) -> u64 {
            1
        }
        fn capabilities(&self) -> crate::vfs::Capabilities {
            crate::vfs::Capabilities::ReadOnly
        }
        fn root_dir(&self) -> nfs3::fileid3 {
            1
        }
        async fn lookup(
            &self,
            _dirid: nfs3::fileid3,
            _filename: &nfs3::filename3,
        ) -> Result<nfs3::fileid3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn getattr(&self, _id: nfs3::fileid3) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn setattr(
            &self,
            _id: nfs3::fileid3,
            _setattr: nfs3::sattr3,
        ) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn read(
            &self,
            _id: nfs3::fileid3,
            _offset: u64,
            _count: u32,
        ) -> Result<(Vec<u8>, bool), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn write(
            &self,
            _id: nfs3::fileid3,
            _offset: u64,
            _data: &[u8],
            _stable: nfs3::file::stable_how,
        ) -> Result<(nfs3::fattr3, nfs3::file::stable_how, nfs3::count3), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn create(
            &self,
            _dirid: nfs3::fileid3,
            _filename: &nfs3::filename3,
            _attr: nfs3::sattr3,
        ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn create_exclusive(
            &self,
            _dirid: nfs3::fileid3,
            _filename: &nfs3::filename3,
            _verifier: nfs3::createverf3,
        ) -> Result<nfs3::fileid3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn mkdir(
            &self,
            _dirid: nfs3::fileid3,
            _dirname: &nfs3::filename3,
        ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn remove(
            &self,
            _dirid: nfs3::fileid3,
            _filename: &nfs3::filename3,
        ) -> Result<(), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn rename(
            &self,
            _from_dirid: nfs3::fileid3,
            _from_filename: &nfs3::filename3,
            _to_dirid: nfs3::fileid3,
            _to_filename: &nfs3::filename3,
        ) -> Result<(), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn readdir(
            &self,
            _dirid: nfs3::fileid3,
            _start_after: nfs3::fileid3,
            _max_entries: usize,
        ) -> Result<crate::vfs::ReadDirResult, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn symlink(
            &self,
            _dirid: nfs3::fileid3,
            _linkname: &nfs3::filename3,
            _symlink: &nfs3::nfspath3,
            _attr: &nfs3::sattr3,
        ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn readlink(&self, _id: nfs3::fileid3) -> Result<nfs3::nfspath3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn link(
            &self,
            _file_id: nfs3::fileid3,
            _link_dir_id: nfs3::fileid3,
            _link_name: &nfs3::filename3,
        ) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn mknod(
            &self,
            _dir_id: nfs3::fileid3,
            _name: &nfs3::filename3,
            _ftype: nfs3::ftype3,
            _specdata: nfs3::specdata3,
            _attrs: &nfs3::sattr3,
        ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
        async fn commit(
            &self,
            _file_id: nfs3::fileid3,
            _offset: u64,
            _count: u32,
        ) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
            Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
        }
    }

    fn test_context() -> Context {
        Context {
            local_port: 2049,
            client_addr: "127.0.0.1:1".to_string(),
            auth: auth_unix::default(),
            vfs: Arc::new(NoopFs),
            mount_signal: None,
            export_name: Arc::new("/".to_string()),
            transaction_tracker: Arc::new(TransactionTracker::new(Duration::from_secs(60))),
            portmap_table: Arc::new(RwLock::new(PortmapTable::default())),
        }
    }

    fn encode_call(call: call_body) -> Vec<u8> {
        let msg = rpc_msg { xid: 42, body: rpc_body::CALL(call) };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn s7_auth_reject_does_not_enqueue() {
        let call = call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: nfs3::VERSION,
            proc: 0,
            cred: opaque_auth { flavor: auth_flavor::AUTH_SHORT, body: Vec::new() },
            verf: opaque_auth::default(),
        };
        let raw = encode_call(call);
        let (tx, mut rx) = mpsc::channel(8);
        let xprt = XprtHandle::new(TransportKind::Datagram, None, 2049);
        let queues = GlobalQueueSet::new();

        let outcome =
            decode_request(xprt, &raw, test_context(), ReplySink::Stream(tx), &queues)
                .await
                .unwrap();

        assert!(matches!(outcome, DecodeOutcome::Replied));
        assert_eq!(queues.enqueued_reqs(), 0);
        let reply = rx.recv().await.expect("auth-rejected call should get a reply");
        let decoded: rpc_msg = deserialize(&mut Cursor::new(&reply)).unwrap();
        match decoded.body {
            rpc_body::REPLY(reply_body::MSG_DENIED(rejected_reply)) => {
                assert!(matches!(
                    rejected_reply,
                    crate::protocol::xdr::rpc::rejected_reply::AUTH_ERROR(
                        auth_stat::AUTH_REJECTEDCRED
                    )
                ));
            }
            other => panic!("expected MSG_DENIED/AUTH_ERROR, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn well_formed_call_is_classified_and_enqueued() {
        let call = call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: nfs3::VERSION,
            proc: nfs3::NFSProgram::NFSPROC3_WRITE as u32,
            cred: opaque_auth::default(),
            verf: opaque_auth::default(),
        };
        let raw = encode_call(call);
        let xprt = XprtHandle::new(TransportKind::Datagram, None, 2049);
        let queues = GlobalQueueSet::new();

        let outcome = decode_request(
            xprt.clone(),
            &raw,
            test_context(),
            ReplySink::Discard,
            &queues,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, DecodeOutcome::Enqueued));
        assert_eq!(queues.enqueued_reqs(), 1);
        assert_eq!(xprt.refcount(), 2, "pipeline's own ref plus the queued Req's ref");
    }

    #[tokio::test]
    async fn dispatch_unknown_program_replies_prog_unavail() {
        let call = call_body {
            rpcvers: 2,
            prog: 999_999,
            vers: 1,
            proc: 0,
            cred: opaque_auth::default(),
            verf: opaque_auth::default(),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let xprt = XprtHandle::new(TransportKind::Datagram, None, 2049);
        let req = Req::new(
            xprt,
            7,
            call,
            Vec::new(),
            Lookahead::default(),
            crate::dispatch::req::QClass::LowLatency,
            test_context(),
            ReplySink::Stream(tx),
        );

        dispatch_req(req).await.unwrap();

        let reply = rx.recv().await.expect("unknown program should still get a reply");
        let decoded: rpc_msg = deserialize(&mut Cursor::new(&reply)).unwrap();
        match decoded.body {
            rpc_body::REPLY(reply_body::MSG_ACCEPTED(accepted)) => {
                assert!(matches!(
                    accepted.reply_data,
                    crate::protocol::xdr::rpc::accept_body::PROG_UNAVAIL
                ));
            }
            other => panic!("expected MSG_ACCEPTED/PROG_UNAVAIL, got {other:?}"),
        }
    }
}
