pub mod metrics;
pub mod tracing;
pub mod analytics;

#[cfg(feature = "ui")]
pub mod ui;

pub use metrics::{LiveMetrics, MetricsCollector, PerformanceMetrics};
pub use analytics::{PerformanceAnalytics, ObservabilityLayer};

#[cfg(feature = "tracing-opentelemetry")]
pub use tracing::{DistributedTracing, SpanCollector};

#[cfg(feature = "ui")]
pub use ui::WebUI;
