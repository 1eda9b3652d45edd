//! Media gallery service library.
//!
//! Request authorization and abuse control in front of an object store:
//! signed bearer tokens, per-client fixed-window rate limiting backed by
//! Redis with an in-process fallback, and storage-key sanitization.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod storage;

pub use config::GalleryConfig;
pub use error::{GalleryError, GalleryResult};
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
