//! Security subsystem: the checks every storage request passes first.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit (per-class, per-client fixed window)     → 429
//!     → auth (token or legacy strategy, via token.rs)       → 401
//!     → sanitize (path / key validation, filename repair)   → 400
//!     → Pass to the object store
//! ```
//!
//! # Design Decisions
//! - Checks run in this order and fail before any storage I/O
//! - Fail closed on credentials and keys; fail open (to local counting)
//!   when the shared rate-limit store is down
//! - No trust in client input

pub mod audit;
pub mod auth;
pub mod clock;
pub mod rate_limit;
pub mod sanitize;
pub mod token;

pub use auth::{AuthStrategy, Authenticator, Credential, Identity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{OperationClass, RateDecision, RateLimiter, WindowLimit};
