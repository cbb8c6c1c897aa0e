//! Caller-supplied configuration for a [`crate::client::Client`] /
//! [`crate::LamderaWebSocket`].

use std::time::Duration;

use lamdera_core::LeaderAvoidanceConfig;

use crate::error::ClientError;

/// The only `duVariant` this adapter implements: a to-backend sum type
/// whose leading constructor is `A String` (see
/// `lamdera_proto::message::DEFAULT_TAG`).
pub const SUPPORTED_DU_VARIANT: u8 = 0;

/// Configuration options, mirroring the caller API surface's documented
/// defaults.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Enables verbose payload-level tracing. Structural events (state
    /// transitions, elections) are logged regardless of this flag.
    pub debug: bool,
    /// Discriminator byte identifying which to-backend sum-type shape is
    /// in use. Only [`SUPPORTED_DU_VARIANT`] (0) is implemented.
    pub du_variant: u8,
    /// Number of self-elections tolerated before giving up.
    pub max_retries: u32,
    /// Base of the exponential reconnect backoff.
    pub retry_base_delay: Duration,
    /// Ceiling the reconnect backoff is clamped to.
    pub retry_max_delay: Duration,
    /// Upper bound of the one-shot jitter applied before the first
    /// connect attempt.
    pub initial_delay_max: Duration,
    /// Overrides session id generation with a caller-supplied value,
    /// instead of generating one at construction.
    pub session_id: Option<String>,
    /// Overrides the `Cookie` header value sent on the initial HTTP
    /// upgrade (ignored in-browser, where the ambient cookie store is
    /// used instead).
    pub cookie: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            debug: false,
            du_variant: SUPPORTED_DU_VARIANT,
            max_retries: 10,
            retry_base_delay: Duration::from_millis(2_000),
            retry_max_delay: Duration::from_millis(15_000),
            initial_delay_max: Duration::from_millis(1_000),
            session_id: None,
            cookie: None,
        }
    }
}

impl ClientOptions {
    /// Validates the options and converts the retry-related fields into a
    /// [`LeaderAvoidanceConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if `du_variant` is
    /// unsupported, or if `retry_base_delay` exceeds `retry_max_delay`
    /// (in which case the backoff formula could never reach its
    /// documented ceiling the way it is specified).
    pub fn validate(&self) -> Result<LeaderAvoidanceConfig, ClientError> {
        if self.du_variant != SUPPORTED_DU_VARIANT {
            return Err(ClientError::InvalidConfig(format!(
                "unsupported duVariant {}, only {SUPPORTED_DU_VARIANT} is implemented",
                self.du_variant
            )));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(ClientError::InvalidConfig(
                "retry_base_delay must not exceed retry_max_delay".to_string(),
            ));
        }
        Ok(LeaderAvoidanceConfig {
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
            initial_delay_max: self.initial_delay_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = ClientOptions::default();
        assert!(!options.debug);
        assert_eq!(options.du_variant, 0);
        assert_eq!(options.max_retries, 10);
        assert_eq!(options.retry_base_delay, Duration::from_millis(2_000));
        assert_eq!(options.retry_max_delay, Duration::from_millis(15_000));
        assert_eq!(options.initial_delay_max, Duration::from_millis(1_000));
        assert!(options.session_id.is_none());
        assert!(options.cookie.is_none());
        options.validate().unwrap();
    }

    #[test]
    fn rejects_unsupported_du_variant() {
        let options = ClientOptions { du_variant: 1, ..ClientOptions::default() };
        assert!(matches!(options.validate(), Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_base_delay_above_max_delay() {
        let options = ClientOptions {
            retry_base_delay: Duration::from_millis(20_000),
            retry_max_delay: Duration::from_millis(15_000),
            ..ClientOptions::default()
        };
        assert!(matches!(options.validate(), Err(ClientError::InvalidConfig(_))));
    }
}
