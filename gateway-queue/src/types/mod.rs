pub mod ids;
pub mod ctx;
pub mod message;
pub mod record;
pub mod priority;
pub mod capabilities;
pub mod events;

pub use ids::{JobId, LeaseToken};
pub use ctx::QueueCtx;
pub use message::JobMessage;
pub use record::{JobRecord, JobStatus, LeasedJob};
pub use priority::JobPriority;
pub use capabilities::QueueCapabilities;
pub use events::JobEvent;
