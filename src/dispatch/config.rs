//! Configuration inputs for the dispatcher, enumerated rather than loaded
//! from any particular file format — configuration loading itself is an
//! external collaborator's responsibility.

use std::collections::HashMap;

use bitflags::bitflags;

use crate::dispatch::proto::Proto;

bitflags! {
    /// Coarse feature flags, analogous to the original `core_options` bitmask.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct CoreOptions: u32 {
        /// Serve NFSv3.
        const NFSV3      = 0b0000_0001;
        /// Serve NFSv4 (recognized for parity with the original bitmask;
        /// this crate implements only NFSv3 handlers).
        const NFSV4      = 0b0000_0010;
        /// Accept connections over VSOCK.
        const NFS_VSOCK  = 0b0000_0100;
        /// Accept connections over RDMA.
        const NFS_RDMA   = 0b0000_1000;
    }
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions::NFSV3
    }
}

/// TCP keepalive tuning. A value of `0` for any of the counters means "don't
/// set this option", matching the original's independent per-field control.
#[derive(Copy, Clone, Debug, Default)]
pub struct KeepaliveConfig {
    pub enabled: bool,
    pub tcp_keepcnt: u32,
    pub tcp_keepidle: u32,
    pub tcp_keepintvl: u32,
}

/// GSS/RPCSEC_GSS context cache tuning.
#[derive(Copy, Clone, Debug)]
pub struct GssConfig {
    pub ctx_hash_partitions: u32,
    pub max_ctx: u32,
    pub max_gc: u32,
}

impl Default for GssConfig {
    fn default() -> Self {
        Self { ctx_hash_partitions: 7, max_ctx: 16384, max_gc: 64 }
    }
}

/// Kerberos principal configuration for GSS credential acquisition.
#[derive(Clone, Debug, Default)]
pub struct Krb5Config {
    pub active: bool,
    pub principal: Option<String>,
}

/// RPC-level tuning: buffer sizes, connection limits, and the decoder
/// "fridge" pool's idle expiration/timeout knobs.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub max_send_buffer_size: usize,
    pub max_recv_buffer_size: usize,
    pub max_connections: usize,
    pub idle_timeout_s: u64,
    pub ioq_thrd_max: usize,
    pub gss: GssConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_send_buffer_size: 256 * 1024,
            max_recv_buffer_size: 256 * 1024,
            max_connections: 1024,
            idle_timeout_s: 300,
            ioq_thrd_max: 200,
            gss: GssConfig::default(),
        }
    }
}

/// The complete set of configuration inputs a `Dispatcher` needs before
/// `start()` is called.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub core_options: CoreOptions,
    pub enable_nlm: bool,
    pub enable_rquota: bool,
    pub keepalive: KeepaliveConfig,
    pub ports: HashMap<&'static str, u16>,
    pub rpc: RpcConfig,
    /// Idle-expiration delay for the decoder fridge's pool growth (§4.7).
    /// No consumer yet: `Fridge` is a fixed-size pool and never retires an
    /// idle worker. See `dispatch::worker`'s module docs.
    pub decoder_fridge_expiration_delay_s: u64,
    /// Read by `Fridge::spawn` (via `Dispatcher::start`) as the dequeue
    /// block timeout passed to `GlobalQueueSet::dequeue_req`.
    pub decoder_fridge_block_timeout_s: u64,
    pub krb5: Krb5Config,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let mut ports = HashMap::new();
        ports.insert("nfs", 2049);
        ports.insert("mount", 20048);
        ports.insert("nlm", 32803);
        ports.insert("rquota", 875);
        Self {
            core_options: CoreOptions::default(),
            enable_nlm: false,
            enable_rquota: false,
            keepalive: KeepaliveConfig::default(),
            ports,
            rpc: RpcConfig::default(),
            decoder_fridge_expiration_delay_s: 60,
            decoder_fridge_block_timeout_s: 5,
            krb5: Krb5Config::default(),
        }
    }
}

impl CoreConfig {
    /// Returns the configured port for a protocol, or its RFC-conventional
    /// default if the caller never overrode it.
    pub fn port_for(&self, proto: Proto) -> u16 {
        let key = match proto {
            Proto::Nfs | Proto::NfsVsock | Proto::NfsRdma => "nfs",
            Proto::Mount => "mount",
            Proto::Nlm => "nlm",
            Proto::Rquota => "rquota",
        };
        *self.ports.get(key).unwrap_or(&2049)
    }

    /// Whether `proto` is enabled under the current `core_options` and
    /// per-protocol toggles.
    pub fn enabled(&self, proto: Proto) -> bool {
        match proto {
            Proto::Nfs => self.core_options.contains(CoreOptions::NFSV3),
            Proto::Mount => self.core_options.contains(CoreOptions::NFSV3),
            Proto::Nlm => self.enable_nlm,
            Proto::Rquota => self.enable_rquota,
            Proto::NfsVsock => self.core_options.contains(CoreOptions::NFS_VSOCK),
            Proto::NfsRdma => self.core_options.contains(CoreOptions::NFS_RDMA),
        }
    }
}
