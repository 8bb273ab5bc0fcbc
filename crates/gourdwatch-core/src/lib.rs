//! # GourdWatch Core
//!
//! Domain model and service seams shared by the scheduler and the HTTP gateway.
//!
//! ## Layout
//! ```text
//! types    MonitoringRecord, HarvestDay, EvidenceImage, UserProfile, GourdType
//! harvest  pollination date → fixed 7-day harvest window
//! traits   MonitoringStore, PushGateway, Clock
//! config   ~/.gourdwatch/config.toml
//! error    GourdWatchError + Result alias
//! ```

pub mod config;
pub mod error;
pub mod harvest;
pub mod traits;
pub mod types;

pub use config::GourdWatchConfig;
pub use error::{GourdWatchError, Result};
pub use harvest::{HarvestWindow, compute_harvest_window};
pub use types::{
    EvidenceImage, EvidenceKind, GourdType, HarvestDay, MonitoringRecord, MonitoringStatus,
    PopulatedRecord, UserProfile,
};
