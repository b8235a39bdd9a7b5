//! Deadline-aware waiting shared by the controller and renderer

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// How long and how often a wait point checks its condition.
///
/// `timeout: None` waits forever, which is also the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Interval between probes of an external condition
    pub poll_interval: Duration,
    /// Deadline for any single wait point
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

impl WaitPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Probe `condition` every `poll_interval` until it reports `true`.
    ///
    /// Errors from the probe end the wait immediately.
    pub fn poll_until<F>(&self, waiting_for: &'static str, mut condition: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let started = Instant::now();
        loop {
            if condition()? {
                return Ok(());
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    return Err(self.timed_out(waiting_for));
                }
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    pub(crate) fn timed_out(&self, waiting_for: &'static str) -> Error {
        Error::Timeout {
            waiting_for,
            after_ms: self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_once_condition_holds() {
        let policy = WaitPolicy { poll_interval: Duration::from_millis(1), timeout: None };
        let mut probes = 0;
        policy
            .poll_until("processed", || {
                probes += 1;
                Ok(probes == 3)
            })
            .unwrap();
        assert_eq!(probes, 3);
    }

    #[test]
    fn deadline_produces_timeout_error() {
        let policy = WaitPolicy::default().with_timeout(Duration::from_millis(20));
        let policy = WaitPolicy { poll_interval: Duration::from_millis(5), ..policy };
        let err = policy.poll_until("processed", || Ok(false)).unwrap_err();
        match err {
            Error::Timeout { waiting_for, after_ms } => {
                assert_eq!(waiting_for, "processed");
                assert_eq!(after_ms, 20);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn probe_errors_propagate() {
        let policy = WaitPolicy::default();
        let err = policy
            .poll_until("processed", || Err(Error::RenderError("Syntax error".into())))
            .unwrap_err();
        assert!(matches!(err, Error::RenderError(_)));
    }
}
