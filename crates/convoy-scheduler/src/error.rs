//! Scheduler error types.

use convoy_core::arn::ArnError;
use convoy_core::{BackendError, ImageError, Partial, ProcessType};
use convoy_lb::LbError;
use thiserror::Error;

/// Errors that can occur while reconciling apps against the container
/// backend.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("container backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Lb(#[from] LbError),

    /// A required configuration field is empty.
    #[error("{0} is required")]
    MissingConfig(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command {command:?}: {source}")]
    Command {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    /// `run` is not supported by the container backend.
    #[error("running a {0} process is not implemented by the container process manager")]
    NotImplemented(&'static str),

    /// Submitting an app stopped at this process.
    #[error("process {process_type}: {source}")]
    Process {
        process_type: ProcessType,
        #[source]
        source: Box<SchedulerError>,
    },

    #[error("invalid task definition {arn}: {reason}")]
    InvalidTaskDefinition { arn: String, reason: String },

    #[error(transparent)]
    Arn(#[from] ArnError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl SchedulerError {
    pub(crate) fn process(process_type: &str, source: SchedulerError) -> Self {
        Self::Process {
            process_type: process_type.to_string(),
            source: Box::new(source),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Result of a listing that may fail after gathering some items.
pub type ListResult<T> = Result<Vec<T>, Partial<Vec<T>, SchedulerError>>;

impl<T> From<Partial<T, SchedulerError>> for SchedulerError {
    fn from(partial: Partial<T, SchedulerError>) -> Self {
        partial.source
    }
}

impl<T> From<Partial<T, LbError>> for SchedulerError {
    fn from(partial: Partial<T, LbError>) -> Self {
        SchedulerError::Lb(partial.source)
    }
}
