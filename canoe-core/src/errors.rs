//! Error types for `canoe_core`.
//!
//! All failures are funnelled through [`CanoeError`], which uses
//! `thiserror` for `Display` and `Error` derives.  PyO3 conversion is
//! handled in the `canoe-pyo3` crate, keeping this crate PyO3-free.
//!
//! Errors are never retried or enriched by this layer: a failed remote
//! call surfaces to the immediate caller exactly once.

use thiserror::Error;

/// Top-level error type for the `canoe_core` library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanoeError {
    /// The handle no longer refers to a live remote object.
    #[error("RemoteUnavailable: {0}")]
    RemoteUnavailable(String),

    /// An indexed or keyed lookup did not resolve.
    #[error("NotFound: {0}")]
    NotFound(String),

    /// The remote interface (or a local pre-check) rejected the arguments.
    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    /// Any other COM failure, including exceptions raised by the server.
    #[error("ComError: {0}")]
    ComError(String),

    /// An awaited application notification did not arrive in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A local filesystem operation failed (e.g. creating a target
    /// directory before a save).
    #[error("IoError: {0}")]
    IoError(String),

    /// The logging context could not be constructed.
    #[error("LoggingError: {0}")]
    LoggingError(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = CanoeError> = std::result::Result<T, E>;

impl CanoeError {
    /// `true` for lookups that missed, as opposed to transport failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CanoeError::NotFound(_))
    }

    /// `true` when the remote object is gone and the handle is unusable.
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, CanoeError::RemoteUnavailable(_))
    }
}

#[cfg(windows)]
mod hresult {
    use super::CanoeError;
    use windows::core::Error as WindowsError;
    use windows::Win32::Foundation::{
        CO_E_OBJNOTCONNECTED, DISP_E_BADINDEX, DISP_E_BADPARAMCOUNT, DISP_E_MEMBERNOTFOUND,
        DISP_E_PARAMNOTOPTIONAL, DISP_E_TYPEMISMATCH, DISP_E_UNKNOWNNAME, E_INVALIDARG,
        RPC_E_DISCONNECTED, RPC_E_SERVER_DIED, RPC_E_SERVER_DIED_DNE,
    };

    // RPC_S_SERVER_UNAVAILABLE is a Win32 code; COM reports it wrapped.
    const RPC_S_SERVER_UNAVAILABLE_HR: i32 = 0x800706BA_u32 as i32;

    /// Classify a `windows::core::Error` (HRESULT failure) into the
    /// binding's error taxonomy.
    impl From<WindowsError> for CanoeError {
        fn from(err: WindowsError) -> Self {
            let code = err.code();
            let message = format!("HRESULT 0x{:08X}: {}", code.0 as u32, err.message());

            if code == RPC_E_DISCONNECTED
                || code == CO_E_OBJNOTCONNECTED
                || code == RPC_E_SERVER_DIED
                || code == RPC_E_SERVER_DIED_DNE
                || code.0 == RPC_S_SERVER_UNAVAILABLE_HR
            {
                CanoeError::RemoteUnavailable(message)
            } else if code == DISP_E_BADINDEX
                || code == DISP_E_MEMBERNOTFOUND
                || code == DISP_E_UNKNOWNNAME
            {
                CanoeError::NotFound(message)
            } else if code == DISP_E_BADPARAMCOUNT
                || code == DISP_E_TYPEMISMATCH
                || code == DISP_E_PARAMNOTOPTIONAL
                || code == E_INVALIDARG
            {
                CanoeError::InvalidArgument(message)
            } else {
                CanoeError::ComError(message)
            }
        }
    }
}
