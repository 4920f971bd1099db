//! Crate-level error types.
//!
//! # Error Taxonomy
//!
//! Every failure sealkeeper can hit falls into one of three kinds, and the
//! top-level driver decides what to do based on the kind rather than helpers
//! exiting the process from deep inside a call chain:
//!
//! - [`ErrorKind::Transient`]: a replica is not accepting connections yet, a
//!   request timed out, a response did not parse, or a control-plane list
//!   failed. Recovered locally by retrying, or by forcing a membership
//!   refresh. Never terminates the process.
//! - [`ErrorKind::Config`]: a required ConfigMap key or environment variable
//!   is absent or malformed. Surfaced immediately as a startup abort, since
//!   continuing would silently run with wrong cluster parameters.
//! - [`ErrorKind::Irrecoverable`]: the unseal credentials cannot be obtained
//!   from memory or from the durable Secret. Fatal; there is no other path to
//!   the key shares. The platform restarts the process, which then re-detects
//!   the already-initialized cluster.
//!
//! # Connection Classification
//!
//! The unseal protocol needs to tell "this address no longer exists" apart
//! from "this replica is still starting up". [`Error::is_connect_failure`]
//! walks the source chain of a transport error looking for a refused or
//! unroutable connection; that outcome marks the address stale and triggers a
//! membership refresh instead of further retries.

use std::io;

use thiserror::Error as ThisError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification driving the abort-or-continue decision at the top
/// level. See the module docs for the full taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retryable locally; never fatal.
    Transient,
    /// Bad or missing configuration; fatal at startup.
    Config,
    /// Lost or unreachable credentials; fatal whenever hit.
    Irrecoverable,
}

/// Errors produced by sealkeeper operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An HTTP request to a replica failed at the transport level.
    #[error("request to {url} failed: {source}")]
    Http {
        /// Full request URL.
        url: String,
        /// Underlying client error; retains the io error chain for
        /// connect-failure classification.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A liveness probe did not answer within its per-attempt timeout.
    #[error("timed out probing {url}")]
    Timeout {
        /// Probed URL.
        url: String,
    },

    /// A replica answered with a body we could not make sense of.
    #[error("unexpected response from {url}: {reason}")]
    Response {
        /// Full request URL.
        url: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// A replica still reported sealed after an unseal attempt that had to
    /// succeed.
    #[error("replica {replica} did not unseal")]
    Unseal {
        /// Name of the replica.
        replica: String,
    },

    /// A control-plane (Kubernetes API) call failed.
    #[error("platform api error: {0}")]
    Platform(String),

    /// A required configuration value is absent or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The unseal credentials are not obtainable from memory or storage.
    #[error("unseal credentials unavailable: {0}")]
    Credentials(String),
}

impl Error {
    /// Classify this error per the crate taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http { .. } | Error::Timeout { .. } | Error::Response { .. } => {
                ErrorKind::Transient
            }
            Error::Unseal { .. } => ErrorKind::Transient,
            Error::Platform(_) => ErrorKind::Transient,
            Error::Config(_) => ErrorKind::Config,
            Error::Credentials(_) => ErrorKind::Irrecoverable,
        }
    }

    /// True when the error may clear on its own and should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// True when the error means the target address refuses or cannot route
    /// connections, i.e. the replica no longer exists at that address.
    ///
    /// Timeouts deliberately do not count: a replica still coming up answers
    /// nothing at all, and gets retried rather than abandoned.
    pub fn is_connect_failure(&self) -> bool {
        let Error::Http { source, .. } = self else {
            return false;
        };
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(source.as_ref());
        while let Some(err) = cause {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                return matches!(
                    io_err.kind(),
                    io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::HostUnreachable
                        | io::ErrorKind::NetworkUnreachable
                );
            }
            cause = err.source();
        }
        false
    }
}
