//! Error breaker that suspends ad processing after repeated failures.

/// Linear backoff with a single retry left after each reinstatement.
///
/// Once `max_errors` errors accumulate, processing is disabled. Each
/// backoff tick counts towards `max_delay_ticks`; when reached, processing
/// resumes with the error count one short of the limit, so the next error
/// trips the breaker again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBackoffPolicy {
    error_count: u32,
    delay_count: u32,
    max_errors: u32,
    max_delay_ticks: u32,
    ads_enabled: bool,
}

impl ErrorBackoffPolicy {
    #[must_use]
    pub fn new(max_errors: u32, max_delay_ticks: u32) -> Self {
        Self {
            error_count: 0,
            delay_count: 0,
            max_errors: max_errors.max(1),
            max_delay_ticks,
            ads_enabled: true,
        }
    }

    pub fn record_error(&mut self, count: u32) {
        self.error_count = self.error_count.saturating_add(count);
        if self.error_count >= self.max_errors {
            if self.ads_enabled {
                log::warn!(
                    "Ad processing suspended after {} errors",
                    self.error_count
                );
            }
            self.ads_enabled = false;
        }
    }

    /// Counts one backoff tick. Does nothing while no errors are recorded.
    pub fn tick_delay(&mut self) {
        if self.error_count == 0 {
            return;
        }
        self.delay_count += 1;
        if self.delay_count >= self.max_delay_ticks {
            self.ads_enabled = true;
            self.error_count = self.max_errors - 1;
            self.delay_count = 0;
            log::info!("Ad processing resumed after backoff");
        }
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.delay_count = 0;
        self.ads_enabled = true;
    }

    #[must_use]
    pub fn ads_enabled(&self) -> bool {
        self.ads_enabled
    }

    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    #[must_use]
    pub fn delay_count(&self) -> u32 {
        self.delay_count
    }

    #[must_use]
    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }
}
