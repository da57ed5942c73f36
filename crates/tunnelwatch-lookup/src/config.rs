//! Client configuration types.

use governor::Quota;
use std::num::NonZeroU32;

/// Request budget for a rate-limited lookup service
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,

    /// Requests allowed in a single burst
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    /// One request per second, no burst. Matches the free host-intel tier.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests_per_second: 1,
            burst: 1,
        }
    }

    /// Set sustained requests per second
    #[must_use]
    pub const fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Set burst size
    #[must_use]
    pub const fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Convert to a governor quota. Zero values are clamped to one.
    #[must_use]
    pub fn quota(&self) -> Quota {
        Quota::per_second(NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_are_clamped() {
        let quota = RateLimitConfig::new().requests_per_second(0).burst(0).quota();
        assert_eq!(quota.burst_size().get(), 1);
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = RateLimitConfig::new().requests_per_second(10).burst(5);
        assert_eq!(config.requests_per_second, 10);
        assert_eq!(config.quota().burst_size().get(), 5);
    }
}
