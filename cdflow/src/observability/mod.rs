//! Observability utilities.

mod logging;
mod tracing;

pub use logging::{init_logging, LogFormat, LOG_ENV};
pub use tracing::SpanTimer;
