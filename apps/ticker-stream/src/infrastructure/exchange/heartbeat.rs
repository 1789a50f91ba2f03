//! Heartbeat and Liveness Tracking
//!
//! Tracks silence on a connection and decides when to probe and when to
//! give up. The supervisor owns one [`LivenessMonitor`] per connection epoch
//! and sleeps until [`LivenessMonitor::next_deadline`] between frames.
//!
//! Two clocks run side by side:
//!
//! - **last frame**: any inbound frame resets it. Silence measured from it
//!   is compared against the dead-link threshold.
//! - **last activity**: a frame or an outbound probe resets it. Silence
//!   measured from it is compared against the receive timeout, so probes
//!   repeat once per receive timeout while the link stays quiet.

use std::time::Duration;

use tokio::time::Instant;

/// Default silence before a heartbeat probe is sent.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default silence before the connection is declared dead.
pub const DEFAULT_DEAD_LINK_THRESHOLD: Duration = Duration::from_secs(30);

/// Longest wait a deadline is allowed to be from its base instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Configuration for liveness tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Silence after which a heartbeat probe is sent.
    pub receive_timeout: Duration,
    /// Total silence after which the connection is abandoned.
    pub dead_link_threshold: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            dead_link_threshold: DEFAULT_DEAD_LINK_THRESHOLD,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(receive_timeout: Duration, dead_link_threshold: Duration) -> Self {
        Self {
            receive_timeout,
            dead_link_threshold,
        }
    }
}

/// What the connection needs right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Frames are arriving; nothing to do.
    Healthy,
    /// Silent for a receive timeout; send a probe.
    ProbeDue,
    /// Silent past the dead-link threshold; reconnect.
    Dead,
}

/// Per-connection silence tracker.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    config: HeartbeatConfig,
    last_frame: Instant,
    last_activity: Instant,
    probes_sent: u32,
}

impl LivenessMonitor {
    /// Start tracking at `now` (usually the moment the connection opened).
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_frame: now,
            last_activity: now,
            probes_sent: 0,
        }
    }

    /// Record that a frame arrived.
    pub const fn record_frame(&mut self, now: Instant) {
        self.last_frame = now;
        self.last_activity = now;
        self.probes_sent = 0;
    }

    /// Record that a probe was sent.
    pub const fn record_probe(&mut self, now: Instant) {
        self.last_activity = now;
        self.probes_sent += 1;
    }

    /// Probes sent since the last frame.
    #[must_use]
    pub const fn probes_sent(&self) -> u32 {
        self.probes_sent
    }

    /// Time since the last frame.
    #[must_use]
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_frame)
    }

    /// The next instant at which [`check`](Self::check) may change verdict.
    ///
    /// Timeouts too large to represent are capped at roughly 30 years out.
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        let probe_at = self.last_activity + self.config.receive_timeout.min(FAR_FUTURE);
        let dead_at = self.last_frame + self.config.dead_link_threshold.min(FAR_FUTURE);
        probe_at.min(dead_at)
    }

    /// Evaluate liveness at `now`.
    #[must_use]
    pub fn check(&self, now: Instant) -> Liveness {
        if self.silence(now) >= self.config.dead_link_threshold {
            Liveness::Dead
        } else if now.saturating_duration_since(self.last_activity) >= self.config.receive_timeout
        {
            Liveness::ProbeDue
        } else {
            Liveness::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.receive_timeout, secs(5));
        assert_eq!(config.dead_link_threshold, secs(30));
    }

    #[test]
    fn probe_due_after_receive_timeout() {
        let start = Instant::now();
        let monitor = LivenessMonitor::new(HeartbeatConfig::default(), start);

        assert_eq!(monitor.check(start + secs(4)), Liveness::Healthy);
        assert_eq!(monitor.check(start + secs(5)), Liveness::ProbeDue);
        assert_eq!(monitor.next_deadline(), start + secs(5));
    }

    #[test]
    fn probes_repeat_until_dead() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(HeartbeatConfig::default(), start);

        let mut probes = 0;
        let now = loop {
            let now = monitor.next_deadline();
            match monitor.check(now) {
                Liveness::ProbeDue => {
                    monitor.record_probe(now);
                    probes += 1;
                }
                Liveness::Dead => break now,
                Liveness::Healthy => unreachable!("deadline should never be healthy"),
            }
        };

        assert_eq!(now, start + secs(30));
        assert_eq!(probes, 5);
        assert_eq!(monitor.probes_sent(), 5);
    }

    #[test]
    fn unbounded_thresholds_cap_the_deadline() {
        let start = Instant::now();
        let config = HeartbeatConfig::new(secs(5), Duration::MAX);
        let mut monitor = LivenessMonitor::new(config, start);
        assert_eq!(monitor.next_deadline(), start + secs(5));

        monitor.record_probe(start + secs(5));
        assert_eq!(monitor.check(start + secs(1_000_000)), Liveness::ProbeDue);

        let idle = LivenessMonitor::new(HeartbeatConfig::new(Duration::MAX, Duration::MAX), start);
        assert_eq!(idle.next_deadline(), start + FAR_FUTURE);
        assert_eq!(idle.check(start + secs(1_000_000)), Liveness::Healthy);
    }

    #[test]
    fn frame_resets_both_clocks() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(HeartbeatConfig::default(), start);
        monitor.record_probe(start + secs(5));
        monitor.record_frame(start + secs(7));

        assert_eq!(monitor.probes_sent(), 0);
        assert_eq!(monitor.silence(start + secs(8)), secs(1));
        assert_eq!(monitor.next_deadline(), start + secs(12));
        assert_eq!(monitor.check(start + secs(36)), Liveness::Dead);
    }
}
