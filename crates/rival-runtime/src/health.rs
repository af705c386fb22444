//! [`LinkHealth`] – heartbeat tracking for the game-state link.
//!
//! Every successful poll is a heartbeat.  The link is considered
//! [`ComponentHealth::TimedOut`] once no heartbeat has arrived within the
//! deadline.  Transitions are logged once each way instead of once per
//! failed poll.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rival_runtime::health::{ComponentHealth, LinkHealth};
//!
//! let mut link = LinkHealth::new("game_service", Duration::from_secs(5));
//! link.heartbeat();
//! assert_eq!(link.health(), ComponentHealth::Healthy);
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// A heartbeat arrived within the deadline.
    Healthy,
    /// No heartbeat within the deadline.
    TimedOut,
}

pub struct LinkHealth {
    name: &'static str,
    timeout: Duration,
    last_heartbeat: Instant,
    reported: ComponentHealth,
    failures: u64,
}

impl LinkHealth {
    /// The link starts healthy with its deadline running from now.
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            timeout,
            last_heartbeat: Instant::now(),
            reported: ComponentHealth::Healthy,
            failures: 0,
        }
    }

    pub fn health(&self) -> ComponentHealth {
        if self.last_heartbeat.elapsed() <= self.timeout {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::TimedOut
        }
    }

    /// Record a successful exchange.
    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
        if self.reported == ComponentHealth::TimedOut {
            info!(
                link = self.name,
                failed_attempts = self.failures,
                "link recovered"
            );
        }
        self.reported = ComponentHealth::Healthy;
        self.failures = 0;
    }

    /// Record a failed exchange.  Returns the health after the failure.
    pub fn failure(&mut self, error: &dyn std::fmt::Display) -> ComponentHealth {
        self.failures += 1;
        let now = self.health();
        if now == ComponentHealth::TimedOut && self.reported == ComponentHealth::Healthy {
            warn!(
                link = self.name,
                error = %error,
                silent_for_ms = self.last_heartbeat.elapsed().as_millis() as u64,
                "link degraded"
            );
            self.reported = ComponentHealth::TimedOut;
        }
        now
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.failures
    }
}
