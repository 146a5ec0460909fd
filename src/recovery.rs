use crate::error::FeedError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Recovery action to take after a failure
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry after a delay
    RetryAfterDelay(Duration),
    /// Stop retrying and keep running on last-known state
    Degrade,
}

/// Retry strategy configuration
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Delay before each attempt
    pub delay: Duration,
}

impl RecoveryConfig {
    /// Fixed delay between a bounded number of attempts
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(1))
    }
}

/// Tracks consecutive failures per component
#[derive(Debug)]
pub struct RecoveryManager {
    config: RecoveryConfig,
    retry_counts: HashMap<String, u32>,
}

impl RecoveryManager {
    /// Create a new recovery manager with default configuration
    pub fn new() -> Self {
        Self::with_config(RecoveryConfig::default())
    }

    /// Create a new recovery manager with custom configuration
    pub fn with_config(config: RecoveryConfig) -> Self {
        Self {
            config,
            retry_counts: HashMap::new(),
        }
    }

    /// Determine the recovery action for a failure
    pub fn handle_failure(&mut self, component: &str, error: &FeedError) -> RecoveryAction {
        let retry_count = self.get_retry_count(component);

        if retry_count >= self.config.max_retries {
            error!(
                "Maximum retries ({}) exceeded for component {}: {}",
                self.config.max_retries, component, error
            );
            return RecoveryAction::Degrade;
        }

        self.retry_counts.insert(component.to_string(), retry_count + 1);
        let delay = self.config.delay;

        info!(
            "Scheduling recovery for {} (attempt {}/{}): {}",
            component,
            retry_count + 1,
            self.config.max_retries,
            error
        );

        RecoveryAction::RetryAfterDelay(delay)
    }

    /// Reset retry count for a component after successful recovery
    pub fn reset_retry_count(&mut self, component: &str) {
        if self.retry_counts.remove(component).is_some() {
            info!("Component {} recovered, reset retry count", component);
        }
    }

    /// Get current retry count for a component
    pub fn get_retry_count(&self, component: &str) -> u32 {
        self.retry_counts.get(component).copied().unwrap_or(0)
    }

    /// Check if component has exceeded retry limit
    pub fn has_exceeded_retry_limit(&self, component: &str) -> bool {
        self.get_retry_count(component) >= self.config.max_retries
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconnection driver for the live feed's push transport
pub struct FeedRecovery {
    recovery_manager: RecoveryManager,
    component: String,
}

impl FeedRecovery {
    pub fn new(component: impl Into<String>, config: RecoveryConfig) -> Self {
        Self {
            recovery_manager: RecoveryManager::with_config(config),
            component: component.into(),
        }
    }

    /// Attempts made since the last successful connection
    pub fn attempts(&self) -> u32 {
        self.recovery_manager.get_retry_count(&self.component)
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.recovery_manager.reset_retry_count(&self.component);
    }

    /// Record a failure and wait out the delay.
    ///
    /// Returns `Err(ReconnectExhausted)` once the attempt budget is spent.
    pub async fn backoff(&mut self, error: &FeedError) -> Result<u32, FeedError> {
        match self.recovery_manager.handle_failure(&self.component, error) {
            RecoveryAction::RetryAfterDelay(delay) => {
                debug!("Waiting {:?} before reconnecting {}", delay, self.component);
                sleep(delay).await;
                Ok(self.attempts())
            }
            RecoveryAction::Degrade => {
                warn!(
                    "{} giving up after {} attempts, keeping last-known state",
                    self.component,
                    self.attempts()
                );
                Err(FeedError::ReconnectExhausted {
                    attempts: self.attempts(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected() -> FeedError {
        FeedError::Disconnected {
            details: "socket reset".to_string(),
        }
    }

    #[test]
    fn test_fixed_delay_until_exhausted() {
        let mut manager = RecoveryManager::with_config(RecoveryConfig::fixed(
            5,
            Duration::from_secs(1),
        ));

        for attempt in 1..=5 {
            assert_eq!(
                manager.handle_failure("feed", &disconnected()),
                RecoveryAction::RetryAfterDelay(Duration::from_secs(1))
            );
            assert_eq!(manager.get_retry_count("feed"), attempt);
        }

        assert!(manager.has_exceeded_retry_limit("feed"));
        assert_eq!(
            manager.handle_failure("feed", &disconnected()),
            RecoveryAction::Degrade
        );
    }

    #[test]
    fn test_reset_clears_attempts() {
        let mut manager = RecoveryManager::new();
        manager.handle_failure("feed", &disconnected());
        manager.reset_retry_count("feed");
        assert_eq!(manager.get_retry_count("feed"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_recovery_waits_fixed_delay() {
        let mut recovery =
            FeedRecovery::new("feed", RecoveryConfig::fixed(2, Duration::from_secs(1)));
        let start = tokio::time::Instant::now();

        assert_eq!(recovery.backoff(&disconnected()).await.unwrap(), 1);
        assert_eq!(recovery.backoff(&disconnected()).await.unwrap(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        let err = recovery.backoff(&disconnected()).await.unwrap_err();
        assert!(matches!(err, FeedError::ReconnectExhausted { attempts: 2 }));
    }
}
