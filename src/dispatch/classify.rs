//! Pure request classification: maps a decoded header plus lookahead bits
//! to a `QClass`, deterministically and without side effects (§8 property 7:
//! "same header+lookahead -> same class").

use crate::dispatch::req::{Lookahead, QClass, ReqKind};
use crate::protocol::xdr::nfs3;

/// Classifies a request per §4.6:
///
/// 1. `NFS_CALL` (server-internal) -> `Call`.
/// 2. Otherwise, if the lookahead carries the `mount` bit -> `Mount`.
/// 3. Otherwise, if the lookahead's high-latency predicate is set -> `HighLatency`.
/// 4. Otherwise -> `LowLatency`.
pub fn classify(kind: ReqKind) -> QClass {
    match kind {
        ReqKind::Call => QClass::Call,
        ReqKind::Decoded(Lookahead { mount: true, .. }) => QClass::Mount,
        ReqKind::Decoded(Lookahead { high_latency: true, .. }) => QClass::HighLatency,
        ReqKind::Decoded(_) => QClass::LowLatency,
    }
}

/// Builds the lookahead bitset for a decoded NFSv3 call. `is_mount` is
/// supplied by the caller, which already knows whether the call arrived on
/// the MOUNT program; the high-latency predicate below recognizes NFSv3
/// procedures that are expected to block on backing storage (writes and
/// namespace mutations) versus ones that normally resolve from cache
/// (reads, metadata lookups).
pub fn lookahead_for_nfs3(proc_num: u32, is_mount: bool) -> Lookahead {
    use nfs3::NFSProgram::*;
    let high_latency = match num_traits::FromPrimitive::from_u32(proc_num) {
        Some(NFSPROC3_WRITE)
        | Some(NFSPROC3_CREATE)
        | Some(NFSPROC3_MKDIR)
        | Some(NFSPROC3_SYMLINK)
        | Some(NFSPROC3_MKNOD)
        | Some(NFSPROC3_REMOVE)
        | Some(NFSPROC3_RMDIR)
        | Some(NFSPROC3_RENAME)
        | Some(NFSPROC3_LINK)
        | Some(NFSPROC3_COMMIT)
        | Some(NFSPROC3_SETATTR) => true,
        _ => false,
    };
    Lookahead { mount: is_mount, high_latency }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_mount_bit_wins() {
        let la = Lookahead { mount: true, high_latency: false };
        assert_eq!(classify(ReqKind::Decoded(la)), QClass::Mount);
    }

    #[test]
    fn s1_high_latency() {
        let la = Lookahead { mount: false, high_latency: true };
        assert_eq!(classify(ReqKind::Decoded(la)), QClass::HighLatency);
    }

    #[test]
    fn s1_call_type() {
        assert_eq!(classify(ReqKind::Call), QClass::Call);
    }

    #[test]
    fn s1_default_low_latency() {
        let la = Lookahead::default();
        assert_eq!(classify(ReqKind::Decoded(la)), QClass::LowLatency);
    }

    #[test]
    fn s1_mount_bit_beats_high_latency() {
        // Mount is checked before the high-latency predicate, per §4.6's
        // ordering; both regressed together for the MOUNT program would
        // still route to Mount.
        let la = Lookahead { mount: true, high_latency: true };
        assert_eq!(classify(ReqKind::Decoded(la)), QClass::Mount);
    }

    #[test]
    fn lookahead_marks_write_high_latency() {
        let la = lookahead_for_nfs3(nfs3::NFSProgram::NFSPROC3_WRITE as u32, false);
        assert!(la.high_latency);
        assert!(!la.mount);
    }

    #[test]
    fn lookahead_marks_getattr_low_latency() {
        let la = lookahead_for_nfs3(nfs3::NFSProgram::NFSPROC3_GETATTR as u32, false);
        assert!(!la.high_latency);
    }
}
