//! Last-writer-wins conflict resolution
//!
//! Divergent copies of a record are ordered by `(version, updated_at,
//! device_id)`. Version counts writes, so the copy with more history wins
//! outright; wall-clock time only breaks version ties, which keeps the
//! outcome stable under moderate clock skew between devices. The final
//! device id comparison is arbitrary but deterministic, so every replica
//! picks the same winner.
//!
//! Deletions take no special path: a tombstone is an ordinary versioned
//! write and loses to any later write of the same record.

use std::cmp::Ordering;

use crate::models::SyncMeta;

/// Outcome of comparing a remote copy against the local row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote copy is newer; overwrite the local row
    RemoteWins,
    /// The local row is as new or newer; leave it alone
    KeepLocal,
}

/// Decide whether a pulled record should replace the local row
///
/// `local` is `None` when the record has never been seen on this device.
/// A full metadata tie means the copies are the same write coming back,
/// so the local row is kept and re-applying a pull batch is a no-op.
#[must_use]
pub fn resolve(local: Option<&SyncMeta>, remote: &SyncMeta) -> Resolution {
    match local {
        None => Resolution::RemoteWins,
        Some(local) => match compare(remote, local) {
            Ordering::Greater => Resolution::RemoteWins,
            Ordering::Less | Ordering::Equal => Resolution::KeepLocal,
        },
    }
}

fn compare(a: &SyncMeta, b: &SyncMeta) -> Ordering {
    a.version
        .cmp(&b.version)
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| a.device_id.cmp(&b.device_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(version: i64, updated_at: i64, device_id: &str) -> SyncMeta {
        SyncMeta {
            user_id: "user-1".to_string(),
            device_id: device_id.to_string(),
            version,
            updated_at,
            is_deleted: false,
        }
    }

    #[test]
    fn test_unknown_record_takes_remote() {
        assert_eq!(resolve(None, &meta(1, 10, "device-b")), Resolution::RemoteWins);
    }

    #[test]
    fn test_higher_version_wins_regardless_of_time() {
        let local = meta(2, 100, "device-a");
        let remote = meta(3, 50, "device-b");
        assert_eq!(resolve(Some(&local), &remote), Resolution::RemoteWins);

        let local = meta(4, 10, "device-a");
        let remote = meta(3, 999, "device-b");
        assert_eq!(resolve(Some(&local), &remote), Resolution::KeepLocal);
    }

    #[test]
    fn test_equal_version_later_timestamp_wins() {
        // Two devices edited the same version offline: 500 at t=10 on one,
        // 700 at t=12 on the other. Every replica must settle on the later
        // write, whichever side it sees as "remote".
        let earlier = meta(2, 10, "device-a");
        let later = meta(2, 12, "device-b");

        assert_eq!(resolve(Some(&earlier), &later), Resolution::RemoteWins);
        assert_eq!(resolve(Some(&later), &earlier), Resolution::KeepLocal);
    }

    #[test]
    fn test_full_timestamp_tie_breaks_on_device_id() {
        let a = meta(2, 10, "device-a");
        let b = meta(2, 10, "device-b");

        assert_eq!(resolve(Some(&a), &b), Resolution::RemoteWins);
        assert_eq!(resolve(Some(&b), &a), Resolution::KeepLocal);
    }

    #[test]
    fn test_identical_metadata_keeps_local() {
        // A device pulling back its own acknowledged write must treat it
        // as a no-op.
        let own = meta(3, 40, "device-a");
        assert_eq!(resolve(Some(&own), &own), Resolution::KeepLocal);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let local = meta(1, 5, "device-a");
        let remote = meta(2, 8, "device-b");

        assert_eq!(resolve(Some(&local), &remote), Resolution::RemoteWins);
        // After applying, the local row carries the remote metadata;
        // seeing the same record again changes nothing.
        assert_eq!(resolve(Some(&remote), &remote), Resolution::KeepLocal);
    }

    #[test]
    fn test_newer_create_beats_tombstone() {
        let tombstone = SyncMeta {
            is_deleted: true,
            ..meta(2, 20, "device-a")
        };
        let recreated = meta(3, 25, "device-b");
        assert_eq!(resolve(Some(&tombstone), &recreated), Resolution::RemoteWins);
    }

    #[test]
    fn test_tombstone_beats_older_update() {
        let stale_update = meta(2, 30, "device-a");
        let tombstone = SyncMeta {
            is_deleted: true,
            ..meta(3, 25, "device-b")
        };
        assert_eq!(resolve(Some(&stale_update), &tombstone), Resolution::RemoteWins);
    }
}
