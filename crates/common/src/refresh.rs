//! Retrieval-interval bookkeeping for one surface.

/// Decides when a surface's campaign should be fetched again.
///
/// An interval of zero means the campaign is fetched once and never
/// refreshed automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshScheduler {
    elapsed_ms: u64,
    interval_ms: u64,
    never_refreshed: bool,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(interval_ms: u64) -> Self {
        Self {
            elapsed_ms: 0,
            interval_ms,
            never_refreshed: true,
        }
    }

    /// Accumulates display time.
    pub fn on_tick(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = self.elapsed_ms.saturating_add(elapsed_ms);
    }

    /// Whether a fetch should happen now.
    ///
    /// Always true before the first successful refresh. When the interval
    /// has elapsed the accumulator is reset as part of the check.
    pub fn is_due(&mut self) -> bool {
        if self.never_refreshed {
            return true;
        }
        if self.interval_ms != 0 && self.elapsed_ms >= self.interval_ms {
            self.elapsed_ms = 0;
            return true;
        }
        false
    }

    pub fn mark_refreshed(&mut self) {
        self.elapsed_ms = 0;
        self.never_refreshed = false;
    }

    /// Keeps the interval within `[max(total_campaign_ms, min_ms), max_ms]`.
    ///
    /// A zero interval stays zero.
    pub fn clamp_interval(&mut self, total_campaign_ms: u64, min_ms: u64, max_ms: u64) {
        if self.interval_ms == 0 {
            return;
        }
        let floor = total_campaign_ms.max(min_ms);
        self.interval_ms = self.interval_ms.max(floor).min(max_ms);
    }

    pub fn set_interval(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    #[must_use]
    pub fn never_refreshed(&self) -> bool {
        self.never_refreshed
    }
}
