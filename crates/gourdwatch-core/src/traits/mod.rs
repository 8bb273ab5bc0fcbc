//! Service seams. Implementations live in the scheduler and gateway crates
//! and are injected as `Arc<dyn ...>`.

pub mod clock;
pub mod push;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use push::{DispatchOutcome, PushGateway, PushMessage};
pub use store::MonitoringStore;
