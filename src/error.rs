//! Error taxonomy shared by every primitive in the crate.
//!
//! Four kinds of failure exist here and they are never conflated:
//! precondition failures raised before any native call ([`Error::Unsupported`]),
//! native-call failures with the OS status preserved ([`Error::Os`]),
//! cooperative cancellation ([`Error::Cancelled`]), and composite failures
//! that keep every underlying cause ([`Error::Aggregate`]).

use std::error;
use std::fmt;

/// Outcome type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised by a suspension primitive.
///
/// `Clone` is deliberate: a latched outcome may be observed by more than one
/// awaiter, so errors are value types, not owning boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The host platform lacks the required capability. Raised synchronously,
    /// before any OS call is attempted.
    Unsupported(&'static str),
    /// A native call returned a non-zero status. The numeric code is the raw
    /// OS status (`errno` on Unix), preserved for the caller.
    Os {
        /// Short name of the native operation that failed.
        op: &'static str,
        /// Raw OS status code.
        code: i32,
    },
    /// The operation was cancelled through its [`CancellationToken`]. A
    /// distinct outcome kind, never merged with a native failure.
    ///
    /// [`CancellationToken`]: crate::sync::CancellationToken
    Cancelled,
    /// A composite operation failed with multiple independent causes, all of
    /// them preserved. Produced by [`task::preserve_faults`]; ordinary
    /// awaiting of the same outcome surfaces only the first cause.
    ///
    /// [`task::preserve_faults`]: crate::task::preserve_faults
    Aggregate(Vec<Error>),
    /// A caller-supplied failure recorded on a [`Promise`].
    ///
    /// [`Promise`]: crate::sync::Promise
    Faulted(String),
}

impl Error {
    /// Builds an [`Error::Os`] from the thread's last OS error value.
    #[cfg(feature = "os")]
    pub(crate) fn last_os(op: &'static str) -> Self {
        Error::Os {
            op,
            code: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsupported(what) => write!(f, "unsupported on this platform: {what}"),
            Error::Os { op, code } => {
                let detail = std::io::Error::from_raw_os_error(*code);
                write!(f, "{op} failed: {detail} (os error {code})")
            }
            Error::Cancelled => f.write_str("operation cancelled"),
            Error::Aggregate(causes) => {
                write!(f, "{} concurrent failure(s)", causes.len())?;
                for (i, cause) in causes.iter().enumerate() {
                    write!(f, "; [{i}] {cause}")?;
                }
                Ok(())
            }
            Error::Faulted(reason) => write!(f, "faulted: {reason}"),
        }
    }
}

impl error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_lists_every_cause() {
        let err = Error::Aggregate(vec![
            Error::Faulted("disk".into()),
            Error::Faulted("net".into()),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 concurrent failure(s)"));
        assert!(text.contains("[0] faulted: disk"));
        assert!(text.contains("[1] faulted: net"));
    }

    #[test]
    fn cancelled_is_distinct_from_os_failure() {
        assert_ne!(Error::Cancelled, Error::Os { op: "read", code: 4 });
    }
}
