//! Queue configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue configuration.
///
/// Timeouts are carried in milliseconds so configurations serialize to flat
/// JSON; `None` disables the corresponding timeout supervisor.
///
/// # Examples
///
/// ```
/// use chanq::config::QueueConfig;
/// use std::time::Duration;
///
/// let cfg = QueueConfig::new(4).with_process_timeout(Duration::from_secs(30));
/// assert_eq!(cfg.channels, 4);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum concurrent in-flight tasks ("channels").
    pub channels: usize,
    /// Maximum time a task may sit in the waiting buffer, in milliseconds.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    /// Maximum time a task may spend executing, in milliseconds.
    #[serde(default)]
    pub process_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    /// One channel per logical CPU, no timeouts.
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl QueueConfig {
    /// Create a configuration with the given concurrency limit and no
    /// timeouts.
    pub const fn new(channels: usize) -> Self {
        Self {
            channels,
            wait_timeout_ms: None,
            process_timeout_ms: None,
        }
    }

    /// Set the waiting-buffer timeout.
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Set the processing deadline.
    pub const fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// The waiting-buffer timeout as a [`Duration`], if configured.
    pub const fn wait_timeout(&self) -> Option<Duration> {
        match self.wait_timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        }
    }

    /// The processing deadline as a [`Duration`], if configured.
    pub const fn process_timeout(&self) -> Option<Duration> {
        match self.process_timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("channels must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse a queue configuration from a JSON string and validate it.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

const fn duration_to_ms(d: Duration) -> u64 {
    let ms = d.as_millis();
    if ms > u64::MAX as u128 {
        u64::MAX
    } else {
        ms as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(QueueConfig::new(1).validate().is_ok());
        assert!(QueueConfig::new(0).validate().is_err());
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_sizes_to_logical_cpus() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.channels, num_cpus::get());
        assert_eq!(cfg.wait_timeout(), None);
        assert_eq!(cfg.process_timeout(), None);
    }

    #[test]
    fn test_timeout_accessors() {
        let cfg = QueueConfig::new(2)
            .with_wait_timeout(Duration::from_millis(50))
            .with_process_timeout(Duration::from_secs(2));
        assert_eq!(cfg.wait_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(cfg.process_timeout(), Some(Duration::from_secs(2)));

        let cfg = QueueConfig::new(2);
        assert_eq!(cfg.wait_timeout(), None);
        assert_eq!(cfg.process_timeout(), None);
    }

    #[test]
    fn test_from_json_str() {
        let cfg = QueueConfig::from_json_str(r#"{"channels": 3, "wait_timeout_ms": 100}"#)
            .expect("valid config");
        assert_eq!(cfg.channels, 3);
        assert_eq!(cfg.wait_timeout(), Some(Duration::from_millis(100)));
        assert_eq!(cfg.process_timeout(), None);

        assert!(QueueConfig::from_json_str(r#"{"channels": 0}"#).is_err());
        assert!(QueueConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let cfg = QueueConfig::new(8).with_process_timeout(Duration::from_millis(750));
        let json = serde_json::to_string(&cfg).expect("serializes");
        let back = QueueConfig::from_json_str(&json).expect("parses back");
        assert_eq!(back.channels, 8);
        assert_eq!(back.process_timeout_ms, Some(750));
    }
}
