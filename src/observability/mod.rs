//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Guards and handlers produce:
//!     → logging.rs (structured log events, request id in the trace span)
//!     → metrics.rs (request, throttle, auth and degradation counters)
//!
//! Consumers:
//!     → Log aggregation (stdout, human or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Credentials and token bodies are never logged
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
