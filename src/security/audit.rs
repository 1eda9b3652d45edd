//! Failed-login audit trail.
//!
//! Each failure is logged and, when a shared store is configured, written as
//! `login_fail:<client>:<epoch ms>` with a one hour TTL. Recording is best
//! effort and never changes the login outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::security::clock::Clock;
use crate::security::rate_limit::SharedStore;

pub const FAILURE_KEY_PREFIX: &str = "login_fail:";
pub const FAILURE_TTL_SECS: u64 = 3600;

#[derive(Debug, Serialize)]
struct FailureRecord<'a> {
    username: &'a str,
    timestamp: u64,
}

pub struct LoginAudit {
    store: Option<Arc<dyn SharedStore>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl LoginAudit {
    pub fn new(store: Option<Arc<dyn SharedStore>>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self { store, clock, timeout }
    }

    pub async fn record_failure(&self, client: &str, username: &str) {
        let timestamp = self.clock.now_millis();
        tracing::warn!(client = %client, username = %username, "Login failed");

        let Some(store) = &self.store else {
            return;
        };

        let key = format!("{FAILURE_KEY_PREFIX}{client}:{timestamp}");
        let value = match serde_json::to_string(&FailureRecord { username, timestamp }) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to encode login failure record");
                return;
            }
        };

        match tokio::time::timeout(self.timeout, store.put(&key, value, FAILURE_TTL_SECS)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Failed to record login failure"),
            Err(_) => tracing::debug!("Timed out recording login failure"),
        }
    }
}
