use std::time::Duration;

use thiserror::Error;

/// Errors raised while relaying a single update or fetching a batch.
/// None of these escape a relay cycle.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed platform response: {0}")]
    Parse(String),

    #[error("model invocation failed: {0}")]
    Invocation(#[from] InvocationError),
}

/// Failure to get a usable reply out of the model.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model process exited with {code}: {stderr}")]
    Exit { code: String, stderr: String },

    #[error("model produced no output")]
    EmptyOutput,

    #[error("model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("model server request failed: {0}")]
    Http(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_error_wraps_into_relay_error() {
        let e: RelayError = InvocationError::EmptyOutput.into();
        assert!(matches!(e, RelayError::Invocation(InvocationError::EmptyOutput)));
        assert!(e.to_string().contains("no output"));
    }

    #[test]
    fn exit_error_carries_stderr() {
        let e = InvocationError::Exit {
            code: "exit status: 1".to_string(),
            stderr: "model 'nope' not found".to_string(),
        };
        assert!(e.to_string().contains("model 'nope' not found"));
    }

    #[test]
    fn timeout_display_names_duration() {
        let e = InvocationError::Timeout(Duration::from_secs(3));
        assert!(e.to_string().contains("3s"));
    }
}
