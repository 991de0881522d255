use super::{Decision, WindowLimits};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Admission instants for one client identity, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ClientWindow {
    timestamps: VecDeque<Instant>,
}

impl ClientWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp `t` with `now - t >= window`.
    ///
    /// Timestamps later than `now` (callers passing instants out of order) are kept; they are
    /// still inside any window that ends at or after them.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        self.timestamps.retain(|&t| !is_stale(t, now, window));
    }

    /// Prune, then admit and record `now` if fewer than `quota` requests remain counted.
    pub fn try_admit(&mut self, now: Instant, limits: WindowLimits) -> Decision {
        self.prune(now, limits.window());

        let counted = self.len();
        let quota = limits.quota() as usize;
        if counted >= quota {
            return Decision::Rejected { retry_after: self.retry_after(now, limits.window()) };
        }

        self.push(now);
        let remaining = quota - counted - 1;
        Decision::Admitted { remaining: u32::try_from(remaining).unwrap_or(u32::MAX) }
    }

    /// Number of timestamps currently held. Only meaningful right after [`prune`](Self::prune).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Count of timestamps still inside the window ending at `now`, without pruning.
    pub fn count_at(&self, now: Instant, window: Duration) -> usize {
        self.timestamps.iter().filter(|&&t| !is_stale(t, now, window)).count()
    }

    /// Oldest counted admission.
    pub fn oldest(&self) -> Option<Instant> {
        self.timestamps.iter().min().copied()
    }

    fn push(&mut self, now: Instant) {
        // Keep the deque ordered even when callers hand us instants out of order.
        let at = self.timestamps.partition_point(|&t| t <= now);
        self.timestamps.insert(at, now);
    }

    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        match self.oldest() {
            // A window too long to represent as an `Instant` never frees a slot in practice.
            Some(oldest) => oldest
                .checked_add(window)
                .map_or(window, |end| end.saturating_duration_since(now)),
            None => Duration::ZERO,
        }
    }
}

fn is_stale(t: Instant, now: Instant, window: Duration) -> bool {
    now.checked_duration_since(t).is_some_and(|age| age >= window)
}
