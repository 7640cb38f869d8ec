//! Reconciliation core for the NFS server dashboard.
//!
//! Snapshot payload types, the list and keyed reconcilers, selection
//! tracking and the derived values shown next to reconciled data. Nothing in
//! this crate performs I/O.

pub mod derive;
pub mod model;
pub mod reconcile;
pub mod selection;

pub use derive::{
    aggregate_addresses, decode_bits, format_addresses, humanize_bytes, humanize_optional,
    state_color, AccessBits,
};
pub use model::{
    AccessMask, Channel, ClientDetail, ClientId, Device, FilesystemSnapshot, FsStats, HealthState,
    OperationCount, OperationCounters, ProtocolFamily, Replica, SessionDetail, SessionId,
    StateColor, StateDetail, StateId, VersionInfo,
};
pub use reconcile::{HiddenSections, Keyed, Reconciled, ReconciledList, Section};
pub use selection::{Reselect, Selection};
