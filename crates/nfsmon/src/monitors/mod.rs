//! One [`Monitor`](crate::scheduler::Monitor) per polled entity.

mod client_summary;
mod clients;
mod filesystem;
mod operations;
mod state_summary;

pub use client_summary::{
    ClientSummaryCommand, ClientSummaryMonitor, ClientSummaryView, StateKind, StateList,
};
pub use clients::{ClientListCommand, ClientListMonitor, ClientListView};
pub use filesystem::{FilesystemMonitor, FilesystemView};
pub use operations::{OperationsMonitor, OperationsView};
pub use state_summary::{StateSummaryMonitor, StateSummaryView};
