//! Error types for the PDF core.
//!
//! The error kinds form a closed set. Every fallible operation either
//! succeeds, soft-fails (a warning is logged and a best-effort substitute is
//! used), or hard-fails with one of the kinds below. Hard failures can be
//! wrapped with [`Error::context`] to build a cause chain for diagnostics.

/// Result type alias for PDF core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds that can occur during PDF processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed token, unexpected token, unbalanced structure
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Object number/generation out of bounds, invalid index, stack
    /// overflow or underflow in a content stream
    #[error("out of range: {0}")]
    Range(String),

    /// Underlying byte source failure, reported upward unchanged
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encryption present and the key was not supplied or is wrong
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Named resource not found in the page's resource dictionary
    #[error("missing resource: {0}")]
    ResourceMissing(String),

    /// Filter or feature known but intentionally not implemented
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Progressive-loading stall; only meaningful for partial loads
    #[error("data not available yet, try later")]
    TryLater,

    /// Cancellation requested via the cookie
    #[error("operation aborted")]
    Abort,

    /// A wrapped error with added context, forming a cause chain
    #[error("{message}")]
    Context {
        /// What the caller was doing when the cause occurred
        message: String,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Shorthand for a [`Error::Syntax`] with a formatted message.
    pub fn syntax(msg: impl Into<String>) -> Self {
        Error::Syntax(msg.into())
    }

    /// Shorthand for a [`Error::Range`] with a formatted message.
    pub fn range(msg: impl Into<String>) -> Self {
        Error::Range(msg.into())
    }

    /// Wrap this error with a context message.
    ///
    /// The original error is retained as the `source` of the returned one,
    /// so diagnostics can walk the full chain.
    pub fn context(self, msg: impl Into<String>) -> Self {
        Error::Context {
            message: msg.into(),
            source: Box::new(self),
        }
    }

    /// The root cause of this error (itself if not wrapped).
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error must propagate even under the interpreter's
    /// catch-and-continue policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self.root_cause(), Error::Abort | Error::TryLater | Error::Io(_))
    }
}

/// Extension for `Result` to attach context to hard failures.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a context message.
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_message() {
        let err = Error::syntax("unbalanced dict");
        assert!(format!("{}", err).contains("unbalanced dict"));
    }

    #[test]
    fn test_context_chain() {
        let root = Error::syntax("bad token");
        let wrapped = root.context("while parsing object 12 0");
        assert!(format!("{}", wrapped).contains("object 12 0"));
        match wrapped.root_cause() {
            Error::Syntax(msg) => assert_eq!(msg, "bad token"),
            other => panic!("unexpected root cause: {other:?}"),
        }
    }

    #[test]
    fn test_abort_is_fatal_through_context() {
        let err = Error::Abort.context("during image decode");
        assert!(err.is_fatal());
        assert!(!Error::syntax("x").is_fatal());
    }

    #[test]
    fn test_source_chain_visible() {
        use std::error::Error as _;
        let err = Error::syntax("inner").context("outer");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
