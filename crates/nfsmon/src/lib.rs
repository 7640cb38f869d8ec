//! Polling runtime for the NFS server dashboard: snapshot sources, the
//! scheduler that drives one poll loop per feed, the per-entity monitors and
//! the pages that own them.

pub mod config;
pub mod monitors;
pub mod pages;
pub mod report;
pub mod scheduler;
pub mod source;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{load_config, Config, ConfigError, PageSelection};
pub use pages::{ClientsChange, ClientsPage, StatsChange, StatsPage};
pub use scheduler::{Feed, FeedHealth, PollConfig, PollHandle, Sequencing};
pub use source::{Endpoint, FetchError, HttpSource, SnapshotSource};
