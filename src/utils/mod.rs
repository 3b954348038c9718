pub mod cache;
pub mod error;
pub mod scheduled_executor;

pub use cache::TtlCache;
pub use error::{AdvisorError, AdvisorResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask, ShutdownHandle};
