//! Per-route request guards.

pub mod guard;

pub use guard::{guard_middleware, Access, RouteGuard};
