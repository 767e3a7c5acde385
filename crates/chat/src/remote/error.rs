//! Remote errors and their transient/fatal classification

/// What went wrong talking to the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The remote answered with an error payload
    Api,
    /// Non-success HTTP status
    Http(u16),
    /// Connection, TLS or timeout failure
    Transport,
    /// Response body could not be decoded
    Decode,
}

/// Error raised by a [`RemoteSource`](super::RemoteSource)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Api, message)
    }
}

/// Whether a failed page request is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Fatal,
}

/// Message the remote's query layer emits for failures that clear up on
/// their own after a while.
const TRANSIENT_PATTERNS: &[&str] = &["Field implementation threw an exception"];

/// Classify a remote error.
///
/// This is a string heuristic over the remote's error text; it is the only
/// place that knows which failures are transient.
pub fn classify(error: &RemoteError) -> ErrorClass {
    match error.kind {
        RemoteErrorKind::Api
            if TRANSIENT_PATTERNS
                .iter()
                .any(|pattern| error.message.contains(pattern)) =>
        {
            ErrorClass::Transient
        }
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_implementation_error_is_transient() {
        let error = RemoteError::api(
            "GraphQL error #None: Errors while executing operation \"MessengerThreads\": \
             At Query.message_thread:MessageThread.messages: Field implementation threw an exception. \
             Check your server logs for more information.",
        );
        assert_eq!(classify(&error), ErrorClass::Transient);
    }

    #[test]
    fn test_other_api_errors_are_fatal() {
        let error = RemoteError::api("Please log in to continue");
        assert_eq!(classify(&error), ErrorClass::Fatal);
    }

    #[test]
    fn test_pattern_outside_api_payload_is_fatal() {
        let error = RemoteError::new(
            RemoteErrorKind::Http(500),
            "Field implementation threw an exception",
        );
        assert_eq!(classify(&error), ErrorClass::Fatal);
    }
}
