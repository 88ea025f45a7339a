//! Error types for bus and netlink operations.

use std::io;

/// Result type for bus and netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on either side of the bus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel (or controller) returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value, positive.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value, positive.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Attribute violates its declared policy.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Generic Netlink family not registered.
    #[error("family not found: {name}")]
    FamilyNotFound {
        /// The family name that was looked up.
        name: String,
    },

    /// Multicast group not part of the family.
    #[error("group {group} not found in family {family}")]
    GroupNotFound {
        /// Family that was searched.
        family: String,
        /// The group name that was looked up.
        group: String,
    },

    /// A family or group index outside the configured address space.
    #[error("{what} {value} out of range, values allowed 0:{max}")]
    OutOfRange {
        /// What kind of index was rejected.
        what: &'static str,
        /// The rejected value.
        value: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// Invalid combination of client options.
    #[error("{0}")]
    Usage(String),

    /// A name or descriptor could not be allocated.
    #[error("out of resources: {0}")]
    ResourceExhausted(String),

    /// Symbolic family or group name could not be turned into an id.
    #[error("unable to resolve {target}: {source}")]
    ResolutionFailed {
        /// Human-readable description of what was being resolved.
        target: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A required attribute is absent from a decoded message.
    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),

    /// Registration of the family set failed and was rolled back.
    #[error("failed to register family {family}: {source}")]
    Startup {
        /// Name of the family being set up when the failure happened.
        family: String,
        /// Number of already registered families that were rolled back.
        rolled_back: usize,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The other end of a loopback socket went away.
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Create a kernel error from an errno value as carried in `nlmsgerr`
    /// (negative).
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Create a kernel error with operation context.
    pub fn from_errno_with_context(errno: i32, operation: impl Into<String>) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::KernelWithContext {
            operation: operation.into(),
            errno: -errno,
            message,
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Wrap a lookup failure with the name of what was being resolved.
    pub fn resolution(target: impl Into<String>, source: Error) -> Self {
        Self::ResolutionFailed {
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is a "not found" error (ENOENT, unknown family or group).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                *errno == libc::ENOENT
            }
            Self::FamilyNotFound { .. } | Self::GroupNotFound { .. } => true,
            Self::ResolutionFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a configuration error (bad client usage or an
    /// out-of-range address).
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::OutOfRange { .. })
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// The negative errno a command handler reports back to its sender.
    pub fn to_nl_errno(&self) -> i32 {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => -errno,
            Self::ResourceExhausted(_) => -libc::ENOMEM,
            Self::FamilyNotFound { .. } | Self::GroupNotFound { .. } => -libc::ENOENT,
            Self::OutOfRange { .. } => -libc::ERANGE,
            Self::Io(err) => -err.raw_os_error().unwrap_or(libc::EIO),
            _ => -libc::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-libc::ENOENT);
        assert!(err.is_not_found());
        assert_eq!(err.errno(), Some(libc::ENOENT));
    }

    #[test]
    fn test_with_context() {
        let err = Error::from_errno(-libc::EEXIST).with_context("registering genl_test0");
        let msg = err.to_string();
        assert!(msg.contains("registering genl_test0"));
        assert_eq!(err.errno(), Some(libc::EEXIST));
    }

    #[test]
    fn test_resolution_keeps_source() {
        let err = Error::resolution(
            "family genl_test4",
            Error::FamilyNotFound {
                name: "genl_test4".into(),
            },
        );
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "unable to resolve family genl_test4: family not found: genl_test4"
        );
    }

    #[test]
    fn test_nl_errno_mapping() {
        assert_eq!(Error::MissingAttribute("MSG").to_nl_errno(), -libc::EINVAL);
        assert_eq!(
            Error::ResourceExhausted("name".into()).to_nl_errno(),
            -libc::ENOMEM
        );
        assert_eq!(Error::from_errno(-libc::EPERM).to_nl_errno(), -libc::EPERM);
    }

    #[test]
    fn test_is_usage() {
        assert!(Error::Usage("both modes".into()).is_usage());
        assert!(
            Error::OutOfRange {
                what: "group",
                value: 500,
                max: 499
            }
            .is_usage()
        );
        assert!(!Error::ConnectionClosed.is_usage());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = Error::OutOfRange {
            what: "group",
            value: 512,
            max: 499,
        };
        assert_eq!(err.to_string(), "group 512 out of range, values allowed 0:499");
    }
}
