//! The Lifecycle Controller (spec.md §4.8): owns every piece this module
//! builds up to this point and drives the strict startup/shutdown ordering.
//!
//! Startup order: queue engine init -> transport library init (a no-op
//! here; tokio needs no separate initialization step) -> create reserved
//! event channels -> load netconfigs (folded into the portmap registrar:
//! this crate's `LocalRegistrar` has no netconfig file to load) -> allocate
//! sockets -> bind -> unregister stale registrations -> create transports
//! -> acquire GSS principal (optional) -> register each enabled
//! `(program, version)`.
//!
//! Shutdown order: signal `SHUTDOWN` to every event channel -> drain
//! workers via fridge teardown -> `unregister_rpc()` -> close sockets
//! (accomplished here by dropping each listener task's owned socket the
//! moment it observes the shutdown token, rather than waiting for the
//! worker drain to finish, so a fast restart doesn't race `EADDRINUSE`).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dispatch::config::{CoreConfig, CoreOptions};
use crate::dispatch::decode::{self, dispatch_req};
use crate::dispatch::error::DispatchError;
use crate::dispatch::evchan::{EventChannelPool, ShutdownToken};
use crate::dispatch::portmap_registrar::{self, PortmapRegistrar};
use crate::dispatch::proto::Proto;
use crate::dispatch::queue::GlobalQueueSet;
use crate::dispatch::req::ReplySink;
use crate::dispatch::socket::{self, ProvisionedSockets};
use crate::dispatch::worker::Fridge;
use crate::dispatch::xprt::{TransportKind, XprtHandle, XprtStat};
use crate::protocol::nfs::portmap::PortmapTable;
use crate::protocol::rpc::{self, Context, TransactionTracker};
use crate::protocol::xdr::nfs3;
use crate::vfs::NFSFileSystem;

/// The protocols a `Dispatcher` brings up listeners for, in startup order.
/// VSOCK/RDMA are configuration-gated add-ons handled separately (see
/// `start`) rather than members of this list: they share the NFS program
/// number but not its UDP/TCP transport pair.
const CORE_PROTOS: [Proto; 4] = [Proto::Nfs, Proto::Mount, Proto::Nlm, Proto::Rquota];

/// Everything a running dispatcher needs to shut down cleanly: the join
/// handles for its listener tasks (so `stop` can wait for sockets to
/// actually close) and the `(program, version)` pairs it registered (so
/// `stop` can unregister exactly those).
pub struct Dispatcher {
    queues: Arc<GlobalQueueSet>,
    evchan: Arc<EventChannelPool>,
    registrar: Arc<dyn PortmapRegistrar>,
    registered: Vec<(u32, u32)>,
    listener_tasks: Vec<JoinHandle<()>>,
    fridge: Option<Fridge>,
    /// Actual bound (udp, tcp) ports per protocol, read back from the
    /// kernel after bind — the caller may have asked for port 0.
    bound_ports: Vec<(Proto, Option<u16>, u16)>,
}

impl Dispatcher {
    /// Runs the full startup sequence and returns a running dispatcher.
    ///
    /// `worker_count` sizes the Worker Dequeue Interface's pool (spec.md
    /// §4.7 describes it as unbounded; callers size it to their workload).
    pub async fn start<T: NFSFileSystem + Send + Sync + 'static>(
        config: CoreConfig,
        vfs: Arc<T>,
        export_name: Arc<String>,
        registrar: Arc<dyn PortmapRegistrar>,
        portmap_table: Arc<RwLock<PortmapTable>>,
        mount_signal: Option<mpsc::Sender<bool>>,
        worker_count: usize,
    ) -> Result<Self, DispatchError> {
        // 1. Queue engine init.
        let queues = Arc::new(GlobalQueueSet::new());
        // 2. Transport library init: nothing to do, tokio's runtime is
        //    already up by the time an async fn runs.
        // 3. Create reserved event channels.
        let evchan = Arc::new(EventChannelPool::new());

        let transaction_tracker =
            Arc::new(TransactionTracker::new(std::time::Duration::from_secs(
                config.rpc.idle_timeout_s,
            )));

        let mut listener_tasks = Vec::new();
        let mut registered = Vec::new();
        let mut bound_ports = Vec::new();

        // rpc.max_connections (§6) caps concurrently accepted TCP
        // connections across every protocol's listener; a permit is held
        // for the lifetime of each accepted connection's task.
        let connection_slots = Arc::new(Semaphore::new(config.rpc.max_connections));

        for proto in CORE_PROTOS {
            if !config.enabled(proto) {
                continue;
            }

            // 7. Unregister stale registrations before standing up fresh
            //    transports for this program/version.
            portmap_registrar::unregister_program(&*registrar, proto.program(), proto.version());

            // 5/6. Allocate and bind sockets.
            let provisioned = socket::allocate_sockets(&config, proto)?;
            let ProvisionedSockets { udp, tcp, .. } = provisioned;
            let tcp_port = tcp.local_addr().map(|a| a.port()).unwrap_or_else(|_| config.port_for(proto));
            let udp_port = udp.as_ref().and_then(|s| s.local_addr().ok()).map(|a| a.port());
            // GETPORT/registration need one port per program; the allocator
            // binds both sockets to the same configured port, so they only
            // disagree when that port was 0 (ephemeral, test-only).
            let reg_port = udp_port.unwrap_or(tcp_port);

            let context_template = Context {
                local_port: reg_port,
                client_addr: String::new(),
                auth: crate::protocol::xdr::rpc::auth_unix::default(),
                vfs: vfs.clone() as Arc<dyn NFSFileSystem + Send + Sync>,
                mount_signal: mount_signal.clone(),
                export_name: export_name.clone(),
                transaction_tracker: transaction_tracker.clone(),
                portmap_table: portmap_table.clone(),
            };

            // 8. Create transports and register them with their reserved
            //    channel. UDP_UREG hosts every protocol's datagram
            //    transport, TCP_UREG every protocol's accept listener; the
            //    3 worker channels only ever see accepted TCP connections,
            //    assigned round-robin in `tcp_accept_loop`.
            if let Some(udp) = udp {
                let udp = Arc::new(udp);
                let xprt = XprtHandle::new(TransportKind::Datagram, None, udp_port.unwrap_or(reg_port));
                xprt.bind_channel(crate::dispatch::evchan::EvChan::UDP_UREG);
                xprt.set_stat(XprtStat::Dispatch);
                listener_tasks.push(tokio::spawn(udp_recv_loop(
                    udp,
                    xprt,
                    context_template.clone(),
                    queues.clone(),
                    evchan.shutdown_token(),
                )));
            }

            let xprt = XprtHandle::new(TransportKind::StreamListener, None, tcp_port);
            xprt.bind_channel(crate::dispatch::evchan::EvChan::TCP_UREG);
            xprt.set_stat(XprtStat::Dispatch);
            let mut tcp_context = context_template.clone();
            tcp_context.local_port = tcp_port;
            listener_tasks.push(tokio::spawn(tcp_accept_loop(
                tcp,
                xprt,
                tcp_context,
                queues.clone(),
                evchan.clone(),
                evchan.shutdown_token(),
                connection_slots.clone(),
                config.rpc.ioq_thrd_max,
            )));

            // 9. GSS principal acquisition: non-fatal startup failure. This
            //    crate has no GSS credential store, so an active krb5
            //    config always degrades to plain AUTH_UNIX dispatch.
            if config.krb5.active {
                warn!(
                    principal = ?config.krb5.principal,
                    "krb5.active is set but this build has no GSS credential store; continuing without RPCSEC_GSS"
                );
            }

            // 10. Register (program, version) against the portmapper.
            portmap_registrar::register_program(
                &*registrar,
                proto.program(),
                proto.version(),
                reg_port,
            )?;
            registered.push((proto.program(), proto.version()));
            bound_ports.push((proto, udp_port, tcp_port));

            info!(?proto, tcp_port, udp_port, "protocol online");
        }

        if config.core_options.contains(CoreOptions::NFS_VSOCK) {
            match socket::bind_vsock(config.port_for(Proto::NfsVsock) as u32) {
                Ok(()) => info!("VSOCK transport online"),
                Err(e) => warn!(error = %e, "VSOCK bind failed, continuing without VSOCK"),
            }
        }
        if config.core_options.contains(CoreOptions::NFS_RDMA) {
            warn!("NFS_RDMA requested but no RDMA verbs stack is part of this build; skipping");
        }

        let fridge = Fridge::spawn(
            queues.clone(),
            worker_count.max(1),
            Duration::from_secs(config.decoder_fridge_block_timeout_s),
            |req| async move { dispatch_req(req).await },
        );

        Ok(Self {
            queues,
            evchan,
            registrar,
            registered,
            listener_tasks,
            fridge: Some(fridge),
            bound_ports,
        })
    }

    /// The shared queue set, exposed for telemetry (`outstanding_reqs_est`)
    /// and for tests that want to enqueue synthetic `Req`s directly.
    pub fn queues(&self) -> &Arc<GlobalQueueSet> {
        &self.queues
    }

    /// The actual `(udp, tcp)` ports bound for a protocol, read back from the
    /// kernel — useful when `CoreConfig::port_for` returned `0`.
    pub fn bound_port(&self, proto: Proto) -> Option<(Option<u16>, u16)> {
        self.bound_ports
            .iter()
            .find(|(p, _, _)| *p == proto)
            .map(|(_, udp, tcp)| (*udp, *tcp))
    }

    /// Runs the shutdown sequence: `SHUTDOWN` to every event channel, drain
    /// workers, best-effort unregister, then wait for every listener task
    /// to observe the shutdown and drop its socket.
    pub async fn stop(mut self) {
        self.evchan.shutdown_all();

        if let Some(fridge) = self.fridge.take() {
            fridge.shutdown().await;
        }

        for (program, version) in &self.registered {
            portmap_registrar::unregister_program(&*self.registrar, *program, *version);
        }

        for task in self.listener_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "listener task panicked during shutdown");
            }
        }
    }
}

/// Drives one protocol's UDP transport: each datagram is handed straight
/// to the Decode Pipeline, with the reply addressed back to the sending
/// peer (a `Datagram` transport has no single connected peer of its own).
async fn udp_recv_loop(
    socket: Arc<UdpSocket>,
    xprt: XprtHandle,
    context_template: Context,
    queues: Arc<GlobalQueueSet>,
    shutdown: ShutdownToken,
) {
    let mut buf = vec![0u8; 65536];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = socket.recv_from(&mut buf) => {
                match res {
                    Ok((n, peer)) => {
                        let mut context = context_template.clone();
                        context.client_addr = peer.to_string();
                        let reply = ReplySink::Datagram { socket: socket.clone(), peer };
                        if let Err(e) = decode::decode_request(
                            xprt.clone(), &buf[..n], context, reply, &queues,
                        ).await {
                            warn!(error = %e, "datagram decode pipeline error");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "UDP recv failed, channel exiting");
                        break;
                    }
                }
            }
        }
    }
    xprt.set_stat(XprtStat::Destroyed);
}

/// Accepts TCP connections for one protocol, assigning each accepted
/// transport to a worker channel round-robin (spec.md §4.4) and spawning
/// its per-connection record-marking loop.
async fn tcp_accept_loop(
    listener: TcpListener,
    listener_xprt: XprtHandle,
    context_template: Context,
    queues: Arc<GlobalQueueSet>,
    evchan: Arc<EventChannelPool>,
    shutdown: ShutdownToken,
    connection_slots: Arc<Semaphore>,
    ioq_thrd_max: usize,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = listener.accept() => {
                match res {
                    Ok((stream, peer)) => {
                        // rpc.max_connections (§6): a connection that can't
                        // acquire a permit is closed immediately rather than
                        // queued, mirroring the original's hard connection cap.
                        let Ok(permit) = connection_slots.clone().try_acquire_owned() else {
                            warn!(%peer, "max_connections reached, refusing connection");
                            drop(stream);
                            continue;
                        };

                        let chan = evchan.assign_worker_channel();
                        let xprt = XprtHandle::new(
                            TransportKind::StreamConnection,
                            Some(peer),
                            context_template.local_port,
                        );
                        // Invariant 6: bound to its channel before the
                        // first read event is delivered.
                        xprt.bind_channel(chan);
                        xprt.set_stat(XprtStat::Dispatch);

                        let mut context = context_template.clone();
                        context.client_addr = peer.to_string();
                        tokio::spawn(tcp_connection_loop(
                            stream, xprt, context, queues.clone(), shutdown.clone(),
                            ioq_thrd_max, permit,
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "TCP accept failed");
                    }
                }
            }
        }
    }
    listener_xprt.set_stat(XprtStat::Destroyed);
}

/// Reassembles record-marked RPC fragments off one accepted connection,
/// feeding each complete record to the Decode Pipeline, and owns the
/// write-back task that serializes replies onto the same stream in
/// whatever order the worker pool finishes them — RPC replies are not
/// ordered with respect to each other even on one transport (spec.md §5).
async fn tcp_connection_loop(
    stream: TcpStream,
    xprt: XprtHandle,
    context: Context,
    queues: Arc<GlobalQueueSet>,
    shutdown: ShutdownToken,
    ioq_thrd_max: usize,
    _connection_permit: tokio::sync::OwnedSemaphorePermit,
) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, mut write_half) = stream.into_split();
    // rpc.ioq_thrd_max (§6) bounds the outbound reply queue depth for this
    // connection; a worker blocks on `reply.send` once it fills up instead
    // of growing without bound.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(ioq_thrd_max.max(1));

    let writer_task = tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            if let Err(e) = rpc::write_fragment(&mut write_half, &buf).await {
                warn!(error = %e, "failed writing RPC reply, closing connection");
                break;
            }
        }
    });

    let mut fragment = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = rpc::read_fragment(&mut read_half, &mut fragment) => {
                match res {
                    Ok(true) => {
                        let record = std::mem::take(&mut fragment);
                        let reply = ReplySink::Stream(tx.clone());
                        if let Err(e) = decode::decode_request(
                            xprt.clone(), &record, context.clone(), reply, &queues,
                        ).await {
                            warn!(error = %e, "stream decode pipeline error");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = %e, "connection read failed");
                        break;
                    }
                }
            }
        }
    }

    xprt.set_stat(XprtStat::Destroyed);
    drop(tx);
    let _ = writer_task.await;
}
