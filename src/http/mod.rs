//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace / timeout / request ID layers)
//!     → middleware/guard.rs (rate limit → 429, credentials → 401)
//!     → handlers.rs (path and key validation → 400, then the object store)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use request::{ClientAddress, X_REQUEST_ID};
pub use server::{AppState, HttpServer, LiveState};
