use std::time::Duration;

use kpisync_common::{A1Range, CellValue};
use kpisync_spec::{DEFAULT_TRANSIENT_PATTERN, RetrySpec};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::store::{GridStore, InputMode, StoreError};

/// Blocking pause between write attempts.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested pauses without sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pub pauses: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub transient: Regex,
}

impl RetryPolicy {
    pub fn from_spec(spec: &RetrySpec) -> Result<Self, regex::Error> {
        Ok(Self {
            attempts: spec.attempts.max(1),
            backoff: Duration::from_secs(spec.backoff_secs),
            transient: Regex::new(&spec.transient_pattern)?,
        })
    }

    pub fn is_transient(&self, err: &StoreError) -> bool {
        self.transient.is_match(err.message())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 12,
            backoff: Duration::from_secs(10),
            transient: Regex::new(DEFAULT_TRANSIENT_PATTERN)
                .expect("default transient pattern must compile"),
        }
    }
}

/// Persists ranges, retrying writes that fail with a transient error.
#[derive(Debug, Clone)]
pub struct WriteRetrier<Z = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: Z,
}

impl<Z: Sleeper> WriteRetrier<Z> {
    pub fn new(policy: RetryPolicy, sleeper: Z) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Write `rows` to `range`. Returns the number of attempts used.
    ///
    /// Transient failures are retried after a fixed backoff up to the policy's
    /// attempt limit; any other failure is returned at once.
    pub fn persist<S: GridStore + ?Sized>(
        &mut self,
        store: &mut S,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<u32, SyncError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match store.update_range(spreadsheet_id, range, rows, mode) {
                Ok(()) => {
                    debug!(range = %range, attempt, "range written");
                    return Ok(attempt);
                }
                Err(err) => err,
            };
            if !self.policy.is_transient(&err) {
                return Err(SyncError::Write {
                    range: range.to_string(),
                    source: err,
                });
            }
            if attempt >= self.policy.attempts {
                return Err(SyncError::RetriesExhausted {
                    range: range.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
            warn!(
                range = %range,
                attempt,
                backoff_secs = self.policy.backoff.as_secs(),
                error = %err,
                "transient write failure, backing off"
            );
            self.sleeper.sleep(self.policy.backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use kpisync_common::ColumnLabel;

    fn retrier(attempts: u32) -> WriteRetrier<RecordingSleeper> {
        WriteRetrier::new(
            RetryPolicy {
                attempts,
                ..RetryPolicy::default()
            },
            RecordingSleeper::default(),
        )
    }

    fn range() -> A1Range {
        A1Range::cell("S", &ColumnLabel::parse("B").unwrap(), 2)
    }

    #[test]
    fn rate_limits_are_retried() {
        let mut store = MemoryStore::new();
        store.fail_next_write(StoreError::with_status(429, "googleapi: Error 429: quota"));
        store.fail_next_write(StoreError::with_status(429, "googleapi: Error 429: quota"));
        let mut retrier = retrier(12);

        let attempts = retrier
            .persist(&mut store, "id", &range(), &[vec![CellValue::Int(1)]], InputMode::Raw)
            .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(retrier.sleeper().pauses, vec![Duration::from_secs(10); 2]);
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn permanent_errors_fail_fast() {
        let mut store = MemoryStore::new();
        store.fail_next_write(StoreError::with_status(403, "googleapi: Error 403: forbidden"));
        let mut retrier = retrier(12);
        let err = retrier
            .persist(&mut store, "id", &range(), &[vec![CellValue::Int(1)]], InputMode::Raw)
            .unwrap_err();
        assert!(matches!(err, SyncError::Write { .. }));
        assert!(retrier.sleeper().pauses.is_empty());
    }

    #[test]
    fn gives_up_after_attempt_limit() {
        let mut store = MemoryStore::new();
        for _ in 0..3 {
            store.fail_next_write(StoreError::new("request timeout: operation timed out"));
        }
        let mut retrier = retrier(3);
        let err = retrier
            .persist(&mut store, "id", &range(), &[vec![CellValue::Int(1)]], InputMode::Raw)
            .unwrap_err();
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(retrier.sleeper().pauses.len(), 2);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn default_pattern_matches_known_transients() {
        let policy = RetryPolicy::default();
        for msg in ["googleapi: Error 429: x", "i/o timeout", "Timed out", "context deadline exceeded"] {
            assert!(policy.is_transient(&StoreError::new(msg)), "{msg}");
        }
        assert!(!policy.is_transient(&StoreError::new("googleapi: Error 400: bad range")));
    }
}
