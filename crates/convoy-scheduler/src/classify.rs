//! Classification of container backend errors.
//!
//! The backend reports a missing or deleted service in several shapes,
//! depending on the call and on its own internal model. Every variant the
//! process managers treat as "no such service" is listed here.

use convoy_core::BackendError;

use crate::error::SchedulerError;

const SERVICE_NOT_FOUND_MESSAGES: &[&str] = &[
    "Service was not ACTIVE.",
    "Service not found.",
    "Could not find returned type com.amazon.madison.cmb#CMServiceNotActiveException in model",
    "Could not find returned type com.amazon.madison.cmb#CMServiceNotFoundException in model",
];

const SERVICE_NOT_FOUND_CODES: &[&str] = &["ServiceNotFoundException", "ServiceNotActiveException"];

/// True when `err` means the service does not exist or is no longer active.
pub fn is_service_not_found(err: &BackendError) -> bool {
    SERVICE_NOT_FOUND_MESSAGES.contains(&err.message.as_str())
        || SERVICE_NOT_FOUND_CODES.contains(&err.code.as_str())
}

/// [`is_service_not_found`] for errors already lifted into a
/// [`SchedulerError`].
pub(crate) fn is_missing_service(err: &SchedulerError) -> bool {
    matches!(err, SchedulerError::Backend(e) if is_service_not_found(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_every_not_found_message() {
        for message in SERVICE_NOT_FOUND_MESSAGES {
            let err = BackendError::new("ClientException", *message);
            assert!(is_service_not_found(&err), "{message}");
        }
    }

    #[test]
    fn recognises_not_found_codes() {
        assert!(is_service_not_found(&BackendError::new(
            "ServiceNotFoundException",
            "something else"
        )));
        assert!(is_service_not_found(&BackendError::new(
            "ServiceNotActiveException",
            ""
        )));
    }

    #[test]
    fn other_errors_are_not_classified() {
        let throttled = BackendError::new("ThrottlingException", "Rate exceeded");
        assert!(!is_service_not_found(&throttled));

        // Near misses are not matched.
        let near = BackendError::new("ClientException", "Service not found");
        assert!(!is_service_not_found(&near));
    }

    #[test]
    fn lifted_errors() {
        let err = SchedulerError::Backend(BackendError::new("ClientException", "Service not found."));
        assert!(is_missing_service(&err));
        assert!(!is_missing_service(&SchedulerError::MissingConfig("cluster")));
    }
}
