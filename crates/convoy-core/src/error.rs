//! Errors shared across Convoy crates.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// An error reported by a remote backend (container scheduling, load
/// balancing or DNS). Carries the backend's own code and message verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A failed loop that still produced results before the failure.
///
/// Listing operations abort at the first error and hand back whatever they
/// gathered so far alongside it.
#[derive(Debug)]
pub struct Partial<T, E> {
    pub partial: T,
    pub source: E,
}

impl<T, E> Partial<T, E> {
    pub fn new(partial: T, source: E) -> Self {
        Self { partial, source }
    }

    /// Convert the underlying error, keeping the partial result.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Partial<T, F> {
        Partial {
            partial: self.partial,
            source: f(self.source),
        }
    }
}

impl<T, E: fmt::Display> fmt::Display for Partial<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl<T: fmt::Debug, E: StdError + 'static> StdError for Partial<T, E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display_includes_code() {
        let err = BackendError::new("ServiceNotFoundException", "Service not found.");
        assert_eq!(err.to_string(), "ServiceNotFoundException: Service not found.");
    }

    #[test]
    fn partial_keeps_results_through_map_err() {
        let partial = Partial::new(vec![1, 2], BackendError::new("Throttling", "slow down"));
        let mapped = partial.map_err(|e| e.message);
        assert_eq!(mapped.partial, vec![1, 2]);
        assert_eq!(mapped.source, "slow down");
    }
}
