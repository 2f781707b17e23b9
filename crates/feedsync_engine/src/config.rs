//! Configuration for the sync engine and poll scheduler.

use crate::error::{SyncError, SyncResult};
use feedsync_protocol::LimitClamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for fetch operations on one feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Page size for a full refresh.
    pub refresh_page_size: u32,
    /// Page size when loading older content.
    pub next_page_size: u32,
    /// Page size when loading newer content.
    pub previous_page_size: u32,
    /// Page size for the polling "latest" fetch.
    pub latest_page_size: u32,
    /// Page size when filling the gap below an unread block.
    pub gap_fill_page_size: u32,
    /// Minimum number of new items before a latest fetch is merged.
    pub new_items_threshold: usize,
    /// Size of a full unread block.
    pub newest_section_length: usize,
    /// Unread blocks larger than this always get a "load more" marker,
    /// since sources may return fewer items than requested.
    pub optimistic_load_more_after: usize,
    /// Bounds applied to every requested limit.
    pub limit_clamp: LimitClamp,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            refresh_page_size: 5,
            next_page_size: 20,
            previous_page_size: 100,
            latest_page_size: 60,
            gap_fill_page_size: 20,
            new_items_threshold: 1,
            newest_section_length: 20,
            optimistic_load_more_after: 15,
            limit_clamp: LimitClamp::between(1, 100, 40),
        }
    }

    /// Sets the refresh page size.
    pub fn with_refresh_page_size(mut self, size: u32) -> Self {
        self.refresh_page_size = size;
        self
    }

    /// Sets the page size for older content.
    pub fn with_next_page_size(mut self, size: u32) -> Self {
        self.next_page_size = size;
        self
    }

    /// Sets the page size for newer content.
    pub fn with_previous_page_size(mut self, size: u32) -> Self {
        self.previous_page_size = size;
        self
    }

    /// Sets the page size for latest fetches.
    pub fn with_latest_page_size(mut self, size: u32) -> Self {
        self.latest_page_size = size;
        self
    }

    /// Sets the default new-items threshold.
    pub fn with_new_items_threshold(mut self, threshold: usize) -> Self {
        self.new_items_threshold = threshold;
        self
    }

    /// Sets the unread block length.
    pub fn with_newest_section_length(mut self, length: usize) -> Self {
        self.newest_section_length = length;
        self
    }

    /// Sets the limit clamp.
    pub fn with_limit_clamp(mut self, clamp: LimitClamp) -> Self {
        self.limit_clamp = clamp;
        self
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> SyncResult<()> {
        let sizes = [
            ("refresh_page_size", self.refresh_page_size),
            ("next_page_size", self.next_page_size),
            ("previous_page_size", self.previous_page_size),
            ("latest_page_size", self.latest_page_size),
            ("gap_fill_page_size", self.gap_fill_page_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(SyncError::InvalidConfig(format!("{} must be positive", name)));
        }
        if self.new_items_threshold == 0 {
            return Err(SyncError::InvalidConfig(
                "new_items_threshold must be positive".into(),
            ));
        }
        if self.newest_section_length == 0 {
            return Err(SyncError::InvalidConfig(
                "newest_section_length must be positive".into(),
            ));
        }
        if self.limit_clamp.min > self.limit_clamp.max {
            return Err(SyncError::InvalidConfig(
                "limit_clamp min exceeds max".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Direction in which the reader consumes a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadDirection {
    /// Newest at the top; polling inserts an unread block.
    TopDown,
    /// Reading upward from older content; polling pages toward the top.
    BottomUp,
}

/// Configuration for the polling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Number of failed ticks tolerated before polling stops.
    pub retry_budget: u32,
    /// Wait after a successful or skipped tick.
    pub frequency: Duration,
    /// Wait before the first tick.
    pub delay: Duration,
    /// How each tick fetches new content.
    pub read_direction: ReadDirection,
    /// Upper bound on previous-page fetches per bottom-up tick.
    pub max_pages_per_tick: u32,
}

impl PollConfig {
    /// Creates a configuration polling at `frequency`.
    pub fn new(frequency: Duration) -> Self {
        Self {
            retry_budget: 5,
            frequency,
            delay: Duration::ZERO,
            read_direction: ReadDirection::TopDown,
            max_pages_per_tick: 10,
        }
    }

    /// Sets the retry budget.
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Sets the initial delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the read direction.
    pub fn with_read_direction(mut self, direction: ReadDirection) -> Self {
        self.read_direction = direction;
        self
    }

    /// Sets the per-tick page limit for bottom-up reading.
    pub fn with_max_pages_per_tick(mut self, pages: u32) -> Self {
        self.max_pages_per_tick = pages;
        self
    }

    /// Wait applied after a failed tick.
    pub fn failure_wait(&self) -> Duration {
        self.frequency / 2
    }

    /// Checks that the configuration is usable.
    ///
    /// A zero frequency would let the loop spin without yielding.
    pub fn validate(&self) -> SyncResult<()> {
        if self.frequency.is_zero() {
            return Err(SyncError::InvalidConfig("frequency must be positive".into()));
        }
        if self.retry_budget == 0 {
            return Err(SyncError::InvalidConfig(
                "retry_budget must be positive".into(),
            ));
        }
        if self.max_pages_per_tick == 0 {
            return Err(SyncError::InvalidConfig(
                "max_pages_per_tick must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_refresh_page_size(10)
            .with_next_page_size(30)
            .with_new_items_threshold(5)
            .with_limit_clamp(LimitClamp::between(1, 80, 40));

        assert_eq!(config.refresh_page_size, 10);
        assert_eq!(config.next_page_size, 30);
        assert_eq!(config.new_items_threshold, 5);
        assert_eq!(config.limit_clamp.max, 80);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sync_config_rejects_zero_sizes() {
        let config = SyncConfig::new().with_latest_page_size(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("latest_page_size"));

        assert!(SyncConfig::new().with_new_items_threshold(0).validate().is_err());
        assert!(SyncConfig::new()
            .with_limit_clamp(LimitClamp::between(50, 10, 20))
            .validate()
            .is_err());
    }

    #[test]
    fn poll_config_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.read_direction, ReadDirection::TopDown);
        assert_eq!(config.max_pages_per_tick, 10);
    }

    #[test]
    fn poll_config_rejects_zero_values() {
        assert!(PollConfig::default().validate().is_ok());

        let err = PollConfig::new(Duration::ZERO).validate().unwrap_err();
        assert!(err.to_string().contains("frequency"));

        let err = PollConfig::default()
            .with_retry_budget(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("retry_budget"));

        let err = PollConfig::default()
            .with_max_pages_per_tick(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.to_string().contains("max_pages_per_tick"));
    }

    #[test]
    fn failure_wait_is_half_frequency() {
        let config = PollConfig::new(Duration::from_secs(10));
        assert_eq!(config.failure_wait(), Duration::from_secs(5));
    }

    #[test]
    fn config_serde() {
        let config = PollConfig::new(Duration::from_secs(3)).with_retry_budget(2);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PollConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
