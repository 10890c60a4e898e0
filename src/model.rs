use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Bound on claim attempts when a contended record vanishes before it can be read.
pub const DEFAULT_MAX_CLAIM_ATTEMPTS: u32 = 3;

/// Longest accepted claim or retention window: 100 years.
pub const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Status stored for a message identity. "Absent" is never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumeStatus {
    /// A worker holds the claim
    Consuming,
    /// Processing finished, duplicates are short-circuited
    Consumed,
}

impl ConsumeStatus {
    /// Integer tag written to the store.
    pub fn tag(self) -> u8 {
        match self {
            Self::Consuming => 1,
            Self::Consumed => 2,
        }
    }
}

impl TryFrom<u8> for ConsumeStatus {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Consuming),
            2 => Ok(Self::Consumed),
            other => Err(Error::Decoding(format!("unknown consume status tag {other}"))),
        }
    }
}

impl fmt::Display for ConsumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consuming => f.write_str("consuming"),
            Self::Consumed => f.write_str("consumed"),
        }
    }
}

/// TTL expiration instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    pub instant: Instant,
}

impl Expiration {
    pub fn new(instant: Instant) -> Self {
        Self { instant }
    }

    /// Fails with [`Error::Config`] if the instant is not representable.
    pub fn from_duration(duration: Duration) -> Result<Self, Error> {
        Instant::now()
            .checked_add(duration)
            .map(Self::new)
            .ok_or_else(|| Error::Config(format!("ttl out of range: {duration:?}")))
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.instant
    }
}

/// A stored claim: status plus the instant it stops counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub status: ConsumeStatus,
    pub expires_on: Expiration,
}

impl Record {
    pub fn new(status: ConsumeStatus, ttl: Duration) -> Result<Self, Error> {
        Ok(Self {
            status,
            expires_on: Expiration::from_duration(ttl)?,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_on.is_expired()
    }
}

/// Timing configuration.
///
/// Zero durations mean "unset" and are rejected once a persistence adapter is
/// configured. Deserializes with every field optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Expiry of the "consuming" claim, in seconds. Should exceed the worst-case worker run.
    pub worker_seconds: u64,
    /// Expiry of the "consumed" record, in seconds. The dedup retention window.
    pub retention_seconds: u64,
    /// How many times a contended claim is retried when the record disappears mid-read.
    pub max_claim_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_seconds: 0,
            retention_seconds: 0,
            max_claim_attempts: DEFAULT_MAX_CLAIM_ATTEMPTS,
        }
    }
}

impl Config {
    pub fn new(worker_seconds: u64, retention_seconds: u64) -> Self {
        Self {
            worker_seconds,
            retention_seconds,
            ..Self::default()
        }
    }

    pub fn worker_ttl(&self) -> Duration {
        Duration::from_secs(self.worker_seconds)
    }

    pub fn retention_ttl(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.worker_seconds == 0 {
            return Err(Error::Config("worker_seconds must be greater than zero".to_string()));
        }
        if self.retention_seconds == 0 {
            return Err(Error::Config(
                "retention_seconds must be greater than zero".to_string(),
            ));
        }
        if self.worker_seconds > MAX_TTL_SECONDS || self.retention_seconds > MAX_TTL_SECONDS {
            return Err(Error::Config(format!(
                "worker_seconds and retention_seconds must not exceed {MAX_TTL_SECONDS}"
            )));
        }
        if self.max_claim_attempts == 0 {
            return Err(Error::Config(
                "max_claim_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tags() {
        assert_eq!(ConsumeStatus::Consuming.tag(), 1);
        assert_eq!(ConsumeStatus::Consumed.tag(), 2);
        assert_eq!(ConsumeStatus::try_from(1).unwrap(), ConsumeStatus::Consuming);
        assert_eq!(ConsumeStatus::try_from(2).unwrap(), ConsumeStatus::Consumed);
    }

    #[test]
    fn test_unknown_status_tag() {
        let err = ConsumeStatus::try_from(0).unwrap_err();
        assert!(matches!(err, Error::Decoding(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_is_expired_past() {
        let expiration = Expiration::from_duration(Duration::from_secs(10)).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(expiration.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_is_expired_future() {
        let expiration = Expiration::from_duration(Duration::from_secs(10)).unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!expiration.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_expiry() {
        let record = Record::new(ConsumeStatus::Consuming, Duration::from_secs(30)).unwrap();
        assert!(!record.is_expired());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(record.is_expired());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.worker_seconds, 0);
        assert_eq!(config.retention_seconds, 0);
        assert_eq!(config.max_claim_attempts, DEFAULT_MAX_CLAIM_ATTEMPTS);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate() {
        assert!(Config::new(30, 3600).validate().is_ok());
        assert!(matches!(Config::new(0, 3600).validate(), Err(Error::Config(_))));
        assert!(matches!(Config::new(30, 0).validate(), Err(Error::Config(_))));

        let config = Config {
            max_claim_attempts: 0,
            ..Config::new(30, 3600)
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_unrepresentable_ttls() {
        assert!(Config::new(MAX_TTL_SECONDS, MAX_TTL_SECONDS).validate().is_ok());
        assert!(matches!(
            Config::new(30, u64::MAX).validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::new(MAX_TTL_SECONDS + 1, 3600).validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_expiration_overflow_is_an_error() {
        let err = Expiration::from_duration(Duration::MAX).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Record::new(ConsumeStatus::Consumed, Duration::MAX).is_err());
    }

    #[test]
    fn test_config_ttls() {
        let config = Config::new(30, 3600);
        assert_eq!(config.worker_ttl(), Duration::from_secs(30));
        assert_eq!(config.retention_ttl(), Duration::from_secs(3600));
    }
}
