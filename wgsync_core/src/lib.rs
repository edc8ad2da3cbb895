//! Core logic for wgsync: peer-list reconciliation and the operations the
//! command-line tool is built from.

pub mod ops;
pub mod reconcile;

pub use ops::{
    apply_conf, fetch_device, generate_psk, show_conf, ApplyMode, OpError, OpResult,
};
pub use reconcile::{reconcile_peers, sync_device, SyncError, SyncResult};
