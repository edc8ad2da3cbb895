//! Peer-list reconciliation between a desired configuration and the live
//! state of a running interface.
//!
//! Applying a parsed file wholesale would churn every peer on the
//! interface and reset their handshake and transfer state. Reconciliation
//! instead rewrites the desired configuration into a minimal delta:
//!
//! * live peers missing from the desired set become synthetic removal
//!   records, prepended so deletions land before reconfigurations;
//! * a desired peer whose live counterpart has no preshared key gets its
//!   preshared key dropped, so stale key material in a file cannot linger
//!   on the device;
//! * the wholesale-replace directive is cleared, since the delta already
//!   accounts for every live peer.
//!
//! The merge works the way a join does: both peer lists are tagged with
//! their origin, sorted by public key with desired entries ordered before
//! live entries carrying the same key, and scanned once. A live entry
//! whose immediate predecessor is a desired entry with the same key has a
//! match; every other live entry is unmatched.

use std::collections::TryReserveError;

use thiserror::Error;
use tracing::{debug, trace};
use wgsync_ipc::{DeviceBackend, IpcError};
use wgsync_model::{DeviceConfig, Peer};

/// Result type for reconciliation.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced while reconciling a configuration against live state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The live-state fetch failed; nothing was applied.
    #[error("unable to retrieve current interface configuration: {0}")]
    Fetch(#[source] IpcError),

    /// The merge list could not be allocated.
    #[error("failed to allocate peer merge list: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Which list a merge entry came from. Desired sorts before live so a
/// live entry's predecessor is its matching desired entry when one
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    Desired,
    Live,
}

/// A provenance-tagged view of one peer record in the merge list.
#[derive(Clone, Copy)]
struct Tagged<'a> {
    origin: Origin,
    /// Position within the origin's peer list.
    index: usize,
    peer: &'a Peer,
}

/// Rewrites `desired` in place into the minimal delta against `live`.
///
/// Both empty inputs are no-ops: an empty desired peer set means "leave
/// peers alone", and an empty live peer set leaves nothing to remove or
/// downgrade. In every other case the wholesale-replace directive on
/// `desired` is cleared, removals are prepended, and preshared keys
/// without a live counterpart are dropped. Peers present only in
/// `desired` pass through untouched, as do transfer counters and
/// handshake state, which are opaque here.
pub fn reconcile_peers(desired: &mut DeviceConfig, live: &DeviceConfig) -> SyncResult<()> {
    if desired.peers.is_empty() || live.peers.is_empty() {
        return Ok(());
    }
    desired.replace_peers = false;

    let mut merged: Vec<Tagged<'_>> = Vec::new();
    merged.try_reserve_exact(desired.peers.len() + live.peers.len())?;
    merged.extend(desired.peers.iter().enumerate().map(|(index, peer)| Tagged {
        origin: Origin::Desired,
        index,
        peer,
    }));
    merged.extend(live.peers.iter().enumerate().map(|(index, peer)| Tagged {
        origin: Origin::Live,
        index,
        peer,
    }));
    merged.sort_unstable_by(|a, b| {
        a.peer
            .public_key
            .cmp(&b.peer.public_key)
            .then(a.origin.cmp(&b.origin))
    });

    let mut removals: Vec<Peer> = Vec::new();
    let mut downgrades: Vec<usize> = Vec::new();
    for (pos, entry) in merged.iter().enumerate() {
        if entry.origin == Origin::Desired {
            continue;
        }
        let matched = pos
            .checked_sub(1)
            .map(|prev| &merged[prev])
            .filter(|prev| {
                prev.origin == Origin::Desired
                    && prev.peer.public_key == entry.peer.public_key
            });
        match matched {
            None => {
                trace!(
                    peer = %entry.peer.public_key,
                    "live peer absent from configuration, scheduling removal"
                );
                removals.push(Peer::removal(entry.peer.public_key));
            }
            Some(matched) => {
                // Live state is authoritative for preshared-key absence.
                if matched.peer.preshared_key.is_some() && entry.peer.preshared_key.is_none() {
                    trace!(
                        peer = %entry.peer.public_key,
                        "peer has no preshared key on the device, dropping configured one"
                    );
                    downgrades.push(matched.index);
                }
            }
        }
    }
    drop(merged);

    let removed = removals.len();
    let downgraded = downgrades.len();
    for index in downgrades {
        desired.peers[index].preshared_key = None;
    }
    if !removals.is_empty() {
        removals.append(&mut desired.peers);
        desired.peers = removals;
    }

    debug!(
        interface = %desired.name,
        removed,
        preshared_dropped = downgraded,
        "reconciled peer lists"
    );
    Ok(())
}

/// Reconciles `desired` against the live state of the interface it names
/// and returns the delta configuration, ready to apply.
///
/// The live state is fetched through `backend` only when the desired
/// configuration actually lists peers; with none, there is nothing to
/// reconcile and the fetch is skipped entirely.
pub async fn sync_device(
    mut desired: DeviceConfig,
    backend: &dyn DeviceBackend,
) -> SyncResult<DeviceConfig> {
    if desired.peers.is_empty() {
        debug!(interface = %desired.name, "configuration lists no peers, skipping reconciliation");
        return Ok(desired);
    }
    let live = backend
        .get_device(&desired.name)
        .await
        .map_err(SyncError::Fetch)?;
    if live.peers.is_empty() {
        debug!(interface = %desired.name, "interface has no peers, nothing to reconcile");
        return Ok(desired);
    }
    reconcile_peers(&mut desired, &live)?;
    Ok(desired)
}
