//! Partner presence for one-to-one conversations.
//!
//! Samples of the partner's last-active time drive a two-state machine with
//! hysteresis, so a partner hovering near the threshold does not flap.

use pchat_common::Timestamp;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Active,
    Idle,
}

/// A state worth showing, with the sample it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceReport {
    pub state: PresenceState,
    pub last_seen: Timestamp,
    /// False when only reported because the refresh was forced
    pub transition: bool,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    threshold_ms: i64,
    interval_ms: i64,
    state: PresenceState,
    last_sample: Option<Timestamp>,
    last_check: Option<Timestamp>,
}

impl PresenceTracker {
    /// Starts out assuming the partner is active.
    pub fn new(threshold: Duration, interval: Duration) -> Self {
        Self {
            threshold_ms: threshold.as_millis() as i64,
            interval_ms: interval.as_millis() as i64,
            state: PresenceState::Active,
            last_sample: None,
            last_check: None,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Whether a sample should be taken at `now`.
    pub fn due(&self, now: Timestamp, force: bool) -> bool {
        force
            || self
                .last_check
                .map_or(true, |checked| now - checked >= self.interval_ms)
    }

    /// Feed one sample. Returns a report for every transition, and for the
    /// current state when `force` is set.
    pub fn observe(
        &mut self,
        last_seen: Timestamp,
        now: Timestamp,
        force: bool,
    ) -> Option<PresenceReport> {
        let inactivity = now - last_seen;
        let sample_changed = self.last_sample.is_some_and(|prev| prev != last_seen);

        let next = match self.state {
            PresenceState::Active if inactivity > self.threshold_ms => Some(PresenceState::Idle),
            PresenceState::Idle if inactivity < self.threshold_ms => Some(PresenceState::Active),
            // Active again and idle again between two samples
            PresenceState::Idle if sample_changed => Some(PresenceState::Idle),
            _ => None,
        };

        self.last_sample = Some(last_seen);
        self.last_check = Some(now);

        match next {
            Some(state) => {
                self.state = state;
                Some(PresenceReport {
                    state,
                    last_seen,
                    transition: true,
                })
            }
            None if force => Some(PresenceReport {
                state: self.state,
                last_seen,
                transition: false,
            }),
            None => None,
        }
    }
}

/// `"<name> is active 2 minutes ago"` / `"<name> went idle an hour ago"`.
pub fn status_line(name: &str, report: &PresenceReport, now: Timestamp) -> String {
    let verb = match report.state {
        PresenceState::Active => "is active",
        PresenceState::Idle => "went idle",
    };
    format!("{} {} {} ago", name, verb, humanize(now - report.last_seen))
}

/// Coarse relative duration.
pub fn humanize(elapsed_ms: i64) -> String {
    let secs = elapsed_ms.max(0) / 1000;
    let minutes = (secs as f64 / 60.0).round() as i64;
    let hours = (secs as f64 / 3600.0).round() as i64;
    let days = (secs as f64 / 86_400.0).round() as i64;

    match secs {
        s if s < 45 => "a few seconds".to_string(),
        s if s < 90 => "a minute".to_string(),
        s if s < 45 * 60 => format!("{} minutes", minutes),
        s if s < 90 * 60 => "an hour".to_string(),
        s if s < 22 * 3600 => format!("{} hours", hours),
        s if s < 36 * 3600 => "a day".to_string(),
        _ => format!("{} days", days),
    }
}
