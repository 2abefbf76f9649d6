//! Retry policy and transient-error classification for uploads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::ProviderError;

/// Status codes treated as transient when no other classifier is configured.
pub const DEFAULT_TRANSIENT_STATUS_CODES: &[u16] = &[408, 409, 425, 429, 500, 503, 504];

/// Backoff schedule for transient upload failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    /// 1s, 2s, 4s, 8s: four retries, five attempts in total.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_retries: 4,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-indexed).
    ///
    /// `delay = base_delay * multiplier^(retry - 1)`; `retry = 0` is treated as 1.
    /// Saturates at [`Duration::MAX`].
    pub fn next_delay(&self, retry: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        Duration::try_from_secs_f64(base_secs * self.multiplier.powi(exponent))
            .unwrap_or(Duration::MAX)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

type Predicate = dyn Fn(&ProviderError) -> bool + Send + Sync;

/// Decides whether a provider error is worth retrying.
///
/// Timeouts and connection resets are always transient, `NotFound`,
/// `Permanent` and plain I/O errors never are. Status errors are decided by a
/// predicate, which defaults to membership in a status-code set.
#[derive(Clone)]
pub struct TransientClassifier {
    predicate: Arc<Predicate>,
}

impl TransientClassifier {
    pub fn from_status_codes(codes: impl IntoIterator<Item = u16>) -> Self {
        let codes: Vec<u16> = codes.into_iter().collect();
        Self::from_predicate(move |err| {
            err.status_code().is_some_and(|code| codes.contains(&code))
        })
    }

    /// Custom rule for status errors.
    pub fn from_predicate<F>(predicate: F) -> Self
    where
        F: Fn(&ProviderError) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn is_transient(&self, err: &ProviderError) -> bool {
        match err {
            ProviderError::Timeout(_) | ProviderError::ConnectionReset(_) => true,
            ProviderError::Status { .. } => (self.predicate)(err),
            ProviderError::NotFound(_) | ProviderError::Permanent(_) | ProviderError::Io(_) => false,
        }
    }
}

impl Default for TransientClassifier {
    fn default() -> Self {
        Self::from_status_codes(DEFAULT_TRANSIENT_STATUS_CODES.iter().copied())
    }
}

impl fmt::Debug for TransientClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientClassifier").finish_non_exhaustive()
    }
}
