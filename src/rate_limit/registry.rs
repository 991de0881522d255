//! Registry of sliding windows keyed by client identity.
//!
//! One registry exists per throttled capability; registries never share state.
//! The whole map sits behind a single `Mutex`: prune + count + append happen as one critical
//! section, so two concurrent checks for the same identity can never both take the last slot.
//! The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::{Admission, ClientWindow, Decision, WindowLimits};
use crate::adaptive::DynamicConfig;
use crate::clock::{Clock, MonotonicClock};

/// Point-in-time view of one identity's window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub identity: String,
    /// Requests currently counted against the quota.
    pub in_window: usize,
}

/// Sliding-window counters for one capability.
#[derive(Debug)]
pub struct RateLimitRegistry {
    name: String,
    limits: DynamicConfig<WindowLimits>,
    clients: Mutex<HashMap<String, ClientWindow>>,
    clock: Arc<dyn Clock>,
}

impl RateLimitRegistry {
    /// Create a registry backed by the monotonic clock.
    pub fn new(name: impl Into<String>, limits: WindowLimits) -> Self {
        Self::with_clock(name, limits, Arc::new(MonotonicClock))
    }

    pub fn with_clock(name: impl Into<String>, limits: WindowLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            limits: DynamicConfig::new(limits),
            clients: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current limits snapshot.
    pub fn limits(&self) -> WindowLimits {
        *self.limits.get()
    }

    /// Swap in new limits. Stored timestamps are kept; if the quota shrinks, affected
    /// identities are rejected until enough of them age out.
    pub fn reconfigure(&self, limits: WindowLimits) {
        let previous = self.limits.replace(limits);
        debug!(
            target: "turnstile::rate_limit",
            registry = %self.name,
            old_quota = previous.quota(),
            new_quota = limits.quota(),
            old_window = ?previous.window(),
            new_window = ?limits.window(),
            "limits reconfigured"
        );
    }

    /// Admission check against the registry's clock.
    pub fn admit(&self, identity: &str) -> Decision {
        self.admit_at(identity, self.clock.now())
    }

    /// Admission check at an explicit instant.
    ///
    /// Fetches or creates the identity's window, prunes it against `now`, and admits only if
    /// the remaining count is below the quota. Never fails.
    pub fn admit_at(&self, identity: &str, now: Instant) -> Decision {
        let limits = self.limits();
        let decision = {
            let mut clients = self.lock();
            match clients.get_mut(identity) {
                Some(window) => window.try_admit(now, limits),
                None => clients.entry(identity.to_string()).or_default().try_admit(now, limits),
            }
        };

        match decision {
            Decision::Admitted { remaining } => trace!(
                target: "turnstile::rate_limit",
                registry = %self.name,
                identity,
                remaining,
                "request admitted"
            ),
            Decision::Rejected { retry_after } => debug!(
                target: "turnstile::rate_limit",
                registry = %self.name,
                identity,
                quota = limits.quota(),
                retry_after = ?retry_after,
                "request rejected"
            ),
        }
        decision
    }

    /// Requests currently counted for `identity`.
    pub fn in_window(&self, identity: &str) -> usize {
        let now = self.clock.now();
        let window = self.limits().window();
        self.lock().get(identity).map_or(0, |w| w.count_at(now, window))
    }

    /// Number of identities with a stored window (including idle ones not yet swept).
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Counted requests per identity, sorted by identity.
    pub fn snapshot(&self) -> Vec<WindowSnapshot> {
        let now = self.clock.now();
        let window = self.limits().window();
        let mut entries: Vec<WindowSnapshot> = self
            .lock()
            .iter()
            .map(|(identity, w)| WindowSnapshot {
                identity: identity.clone(),
                in_window: w.count_at(now, window),
            })
            .collect();
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        entries
    }

    /// Evict identities whose window is empty at the registry clock's `now`.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    /// Evict identities whose window is empty at `now`. Returns how many were removed.
    ///
    /// An empty window admits exactly like a missing one, so eviction never changes a decision.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.limits().window();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, w| {
            w.prune(now, window);
            !w.is_empty()
        });
        let removed = before - clients.len();
        if removed > 0 {
            debug!(
                target: "turnstile::rate_limit",
                registry = %self.name,
                removed,
                remaining = clients.len(),
                "idle client windows evicted"
            );
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `every` on the tokio runtime.
    ///
    /// The task holds a weak reference and exits once the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else { break };
                registry.sweep();
            }
        })
    }

    // Every mutation leaves the map consistent, so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientWindow>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Admission for RateLimitRegistry {
    fn admit(&self, identity: &str) -> Decision {
        RateLimitRegistry::admit(self, identity)
    }
}
