//! Crate-wide error type, grounded in spec.md §7's error-kind table.

use thiserror::Error;

/// Errors produced anywhere in the SteadyScript pipeline.
///
/// Each variant corresponds to one row of spec.md §7. The disposition
/// (fatal / logged-and-continue / reported-to-client) is decided by the
/// caller, not by this type -- this type only carries the classification.
#[derive(Debug, Error)]
pub enum Error {
    /// The capture device could not be opened at startup. Fatal: the
    /// process exits with a non-zero code.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A single frame read failed but the device itself is still usable.
    /// Recoverable: the caller reuses the previous frame.
    #[error("transient capture error: {0}")]
    TransientCapture(String),

    /// A client sent a control command whose precondition (spec.md §4.4)
    /// was not satisfied. Reported back to the issuing client only; state
    /// is left unchanged.
    #[error("invalid control: {0}")]
    InvalidControl(String),

    /// A duplex message was not valid JSON, or had an unrecognized `type`
    /// tag. Logged and dropped; the connection is preserved.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The session store could not durably commit a record after
    /// retrying. Surfaced to all connected clients as an `error` message.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The LED gateway's serial transport failed to write. Logged (rate
    /// limited); the gateway silently no-ops afterwards.
    #[error("LED transport failure: {0}")]
    LedTransportFailure(String),

    /// A client's transport (websocket or HTTP) dropped mid-write. The
    /// owning client task is torn down; the pipeline is unaffected.
    #[error("client transport error: {0}")]
    ClientTransportError(String),

    /// Wrapped I/O error for conversions via `?`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped JSON (de)serialization error for conversions via `?`.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
