//! Leader-avoidance loop.
//!
//! In the host, one connected client per session is designated the
//! "leader" and expected to run authoritative logic the backend relies
//! on. A plain client library is the wrong process to play that role, so
//! this loop watches election frames and, when it detects its own client
//! id was chosen, tears down and reconnects under a fresh session until it
//! is merely a follower.

use std::time::Duration;

use crate::{env::Environment, error::LeaderAvoidanceError};

/// Time allowed (as a ceiling) for the jittered reconnect backoff.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_millis(15_000);

/// Base of the exponential backoff, before jitter.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(2_000);

/// Upper bound of the one-shot initial-connect jitter.
pub const DEFAULT_INITIAL_DELAY_MAX: Duration = Duration::from_millis(1_000);

/// Default retry budget before giving up and firing `onleaderdisconnect`.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Configuration for the leader-avoidance loop.
#[derive(Debug, Clone, Copy)]
pub struct LeaderAvoidanceConfig {
    /// Number of self-elections tolerated before giving up.
    pub max_retries: u32,
    /// Base of the exponential backoff (multiplied by `1.5^(retryCount-1)`).
    pub retry_base_delay: Duration,
    /// Ceiling the backoff delay is clamped to.
    pub retry_max_delay: Duration,
    /// Upper bound of the one-shot jitter applied before the very first
    /// connect attempt.
    pub initial_delay_max: Duration,
}

impl Default for LeaderAvoidanceConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            initial_delay_max: DEFAULT_INITIAL_DELAY_MAX,
        }
    }
}

/// Outcome of processing one election frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ElectionOutcome {
    /// Someone else was elected; `leaderId` is updated but nothing else
    /// changes.
    FollowerUpdate {
        /// Leader id before this election, if any.
        previous_leader: Option<String>,
        /// Newly elected leader id.
        new_leader: String,
    },
    /// This client was elected. The connection must be torn down and a
    /// reconnect scheduled, unless the retry budget is exhausted.
    SelfElected {
        /// Retry count after this self-election (incremented before this
        /// value was computed).
        retry_count: u32,
        /// `Ok(delay)` to schedule a reconnect, `Err` if the retry budget
        /// is exhausted and the adapter should give up.
        outcome: Result<Duration, LeaderAvoidanceError>,
    },
}

/// Tracks retry count, the last-assigned client id, and the
/// last-observed leader id across the lifetime of a `LamderaWebSocket`
/// instance (survives session rotation).
///
/// The client id used for self-election comparison is tracked here rather
/// than read from `Connection` at evaluation time: the host may keep
/// re-electing the same client across a reconnect that has not yet
/// produced a new handshake, and `Connection` clears its id as soon as
/// teardown starts. This loop keeps its own copy, updated only on a
/// successful handshake.
#[derive(Debug, Clone)]
pub struct LeaderAvoidance {
    config: LeaderAvoidanceConfig,
    retry_count: u32,
    leader_id: Option<String>,
    client_id: Option<String>,
}

impl LeaderAvoidance {
    /// Creates a new tracker with a zeroed retry count and no known client
    /// id (no election can be a self-election until a handshake happens).
    #[must_use]
    pub fn new(config: LeaderAvoidanceConfig) -> Self {
        Self { config, retry_count: 0, leader_id: None, client_id: None }
    }

    /// Current retry count.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Last-observed leader id, if any election frame has been seen.
    #[must_use]
    pub fn leader_id(&self) -> Option<&str> {
        self.leader_id.as_deref()
    }

    /// Records the client id assigned by a just-completed handshake and
    /// resets the retry count. The host's behavior on elections repeating
    /// the current leader id is not specified, so this loop re-evaluates
    /// every election the same way rather than special-casing a repeat.
    pub fn reset_on_handshake(&mut self, client_id: &str) {
        self.retry_count = 0;
        self.client_id = Some(client_id.to_string());
    }

    /// Processes one election frame, updating `leaderId` unconditionally
    /// and comparing it against the last client id assigned at handshake.
    pub fn evaluate_election<E: Environment>(
        &mut self,
        new_leader: &str,
        env: &E,
    ) -> ElectionOutcome {
        let previous_leader = self.leader_id.clone();
        self.leader_id = Some(new_leader.to_string());

        if self.client_id.as_deref() != Some(new_leader) {
            return ElectionOutcome::FollowerUpdate {
                previous_leader,
                new_leader: new_leader.to_string(),
            };
        }

        self.retry_count += 1;
        let outcome = if self.retry_count <= self.config.max_retries {
            Ok(self.backoff_delay(env))
        } else {
            Err(LeaderAvoidanceError::RetriesExhausted { retry_count: self.retry_count })
        };

        // Teardown on self-election clears the just-learned leader id;
        // a fresh one arrives with the next election frame after
        // reconnecting.
        self.leader_id = None;

        ElectionOutcome::SelfElected { retry_count: self.retry_count, outcome }
    }

    /// Whether a send issued right now falls inside the self-election
    /// retry window and must be dropped rather than queued, per the
    /// "do not perturb the new session" rule.
    #[must_use]
    pub fn is_mid_avoidance(&self) -> bool {
        self.retry_count > 0 && self.retry_count <= self.config.max_retries
    }

    /// `D = min(retryMaxDelay, retryBaseDelay * 1.5^(retryCount-1) + U(0, 1000))`.
    ///
    /// Defined for `retry_count >= 1`, which always holds here since this
    /// is only called immediately after incrementing it.
    fn backoff_delay<E: Environment>(&self, env: &E) -> Duration {
        debug_assert!(self.retry_count >= 1);
        let exponent = i32::try_from(self.retry_count - 1).unwrap_or(i32::MAX);
        let base_ms = self.config.retry_base_delay.as_millis() as f64 * 1.5f64.powi(exponent);
        let jitter_ms = env.random_unit_interval() * 1000.0;
        let total_ms = (base_ms + jitter_ms).min(self.config.retry_max_delay.as_millis() as f64);
        Duration::from_millis(total_ms as u64)
    }

    /// The one-shot jitter applied before the very first connect attempt,
    /// so that many clients starting together spread their handshake
    /// arrivals and reduce the odds any one of them is elected leader.
    pub fn initial_connect_jitter<E: Environment>(&self, env: &E) -> Duration {
        let max_ms = self.config.initial_delay_max.as_millis() as f64;
        Duration::from_millis((env.random_unit_interval() * max_ms) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnv;

    #[test]
    fn follower_update_does_not_touch_retry_count() {
        let env = MockEnv::new(1);
        let mut leader = LeaderAvoidance::new(LeaderAvoidanceConfig::default());
        leader.reset_on_handshake("X1");

        let outcome = leader.evaluate_election("Y2", &env);
        assert_eq!(
            outcome,
            ElectionOutcome::FollowerUpdate { previous_leader: None, new_leader: "Y2".to_string() }
        );
        assert_eq!(leader.retry_count(), 0);
        assert_eq!(leader.leader_id(), Some("Y2"));
    }

    #[test]
    fn election_before_any_handshake_is_never_self() {
        let env = MockEnv::new(10);
        let mut leader = LeaderAvoidance::new(LeaderAvoidanceConfig::default());
        let outcome = leader.evaluate_election("X1", &env);
        assert!(matches!(outcome, ElectionOutcome::FollowerUpdate { .. }));
    }

    #[test]
    fn self_election_increments_and_schedules_backoff() {
        let env = MockEnv::new(2);
        let mut leader = LeaderAvoidance::new(LeaderAvoidanceConfig::default());
        leader.reset_on_handshake("X1");

        let outcome = leader.evaluate_election("X1", &env);
        match outcome {
            ElectionOutcome::SelfElected { retry_count, outcome } => {
                assert_eq!(retry_count, 1);
                let delay = outcome.unwrap();
                assert!(delay.as_millis() >= 2_000);
                assert!(delay.as_millis() <= 3_000);
            },
            ElectionOutcome::FollowerUpdate { .. } => panic!("expected self-election"),
        }
        assert_eq!(leader.retry_count(), 1);
    }

    #[test]
    fn repeated_self_election_without_intervening_handshake_keeps_counting() {
        let env = MockEnv::new(11);
        let config = LeaderAvoidanceConfig { max_retries: 5, ..LeaderAvoidanceConfig::default() };
        let mut leader = LeaderAvoidance::new(config);
        leader.reset_on_handshake("X1");

        leader.evaluate_election("X1", &env);
        assert_eq!(leader.retry_count(), 1);
        // No reset_on_handshake call here: the host re-elects the same
        // client before a new handshake completes.
        let outcome = leader.evaluate_election("X1", &env);
        match outcome {
            ElectionOutcome::SelfElected { retry_count, .. } => assert_eq!(retry_count, 2),
            ElectionOutcome::FollowerUpdate { .. } => panic!("expected self-election"),
        }
    }

    #[test]
    fn backoff_is_clamped_to_retry_max_delay() {
        let env = MockEnv::new(3);
        let config = LeaderAvoidanceConfig { max_retries: 20, ..LeaderAvoidanceConfig::default() };
        let mut leader = LeaderAvoidance::new(config);
        leader.reset_on_handshake("X1");

        for _ in 0..10 {
            leader.evaluate_election("X1", &env);
        }
        let outcome = leader.evaluate_election("X1", &env);
        match outcome {
            ElectionOutcome::SelfElected { outcome, .. } => {
                let delay = outcome.unwrap();
                assert!(delay <= DEFAULT_RETRY_MAX_DELAY);
            },
            ElectionOutcome::FollowerUpdate { .. } => panic!("expected self-election"),
        }
    }

    #[test]
    fn retries_exhausted_past_max_retries() {
        let env = MockEnv::new(4);
        let config = LeaderAvoidanceConfig { max_retries: 2, ..LeaderAvoidanceConfig::default() };
        let mut leader = LeaderAvoidance::new(config);
        leader.reset_on_handshake("X1");

        leader.evaluate_election("X1", &env);
        leader.evaluate_election("X1", &env);
        let outcome = leader.evaluate_election("X1", &env);

        match outcome {
            ElectionOutcome::SelfElected { retry_count, outcome } => {
                assert_eq!(retry_count, 3);
                assert_eq!(outcome, Err(LeaderAvoidanceError::RetriesExhausted { retry_count: 3 }));
            },
            ElectionOutcome::FollowerUpdate { .. } => panic!("expected self-election"),
        }
    }

    #[test]
    fn reset_on_handshake_zeroes_retry_count() {
        let env = MockEnv::new(5);
        let mut leader = LeaderAvoidance::new(LeaderAvoidanceConfig::default());
        leader.reset_on_handshake("X1");
        leader.evaluate_election("X1", &env);
        assert_eq!(leader.retry_count(), 1);
        leader.reset_on_handshake("X2");
        assert_eq!(leader.retry_count(), 0);
    }

    #[test]
    fn self_election_clears_leader_id_until_next_election() {
        let env = MockEnv::new(7);
        let mut leader = LeaderAvoidance::new(LeaderAvoidanceConfig::default());
        leader.reset_on_handshake("X1");
        leader.evaluate_election("X1", &env);
        assert_eq!(leader.leader_id(), None);
    }

    #[test]
    fn mid_avoidance_window_tracks_retry_count() {
        let env = MockEnv::new(8);
        let config = LeaderAvoidanceConfig { max_retries: 1, ..LeaderAvoidanceConfig::default() };
        let mut leader = LeaderAvoidance::new(config);
        leader.reset_on_handshake("X1");
        assert!(!leader.is_mid_avoidance());
        leader.evaluate_election("X1", &env);
        assert!(leader.is_mid_avoidance());
        leader.evaluate_election("X1", &env);
        assert!(!leader.is_mid_avoidance());
    }

    #[test]
    fn initial_connect_jitter_is_bounded() {
        let env = MockEnv::new(6);
        let leader = LeaderAvoidance::new(LeaderAvoidanceConfig::default());
        for _ in 0..100 {
            let delay = leader.initial_connect_jitter(&env);
            assert!(delay <= DEFAULT_INITIAL_DELAY_MAX);
        }
    }
}
