//! Results for reads that degrade to a default instead of failing.
//!
//! Probing a file or reading its tags never aborts a batch: a missing tool, a
//! corrupt container, or unparsable output all yield an empty value. The
//! [`Lenient`] wrapper keeps that contract in the type while still carrying
//! the reason, so callers can log it.

use crate::error::Error;

/// A value that is always present, plus the error that forced it to its
/// default (if any).
#[derive(Debug)]
#[must_use]
pub struct Lenient<T> {
    value: T,
    degraded: Option<Error>,
}

impl<T> Lenient<T> {
    /// A successful read.
    pub fn ok(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    /// A read that fell back to `value` because of `error`.
    pub fn degraded(value: T, error: Error) -> Self {
        Self {
            value,
            degraded: Some(error),
        }
    }

    /// Build from a `Result`, substituting `T::default()` on error.
    pub fn from_result(result: crate::Result<T>) -> Self
    where
        T: Default,
    {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::degraded(T::default(), e),
        }
    }

    /// Borrow the value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the wrapper, discarding the degradation reason.
    pub fn into_value(self) -> T {
        self.value
    }

    /// The error that caused the fallback, if any.
    pub fn degradation(&self) -> Option<&Error> {
        self.degraded.as_ref()
    }

    /// Whether the value is a fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Split into the value and the optional degradation reason.
    pub fn into_parts(self) -> (T, Option<Error>) {
        (self.value, self.degraded)
    }
}
