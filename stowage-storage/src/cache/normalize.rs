//! Backend error normalization.
//!
//! The single place where backend classifications are translated into the
//! [`DatastoreError`] taxonomy. Mapping is keyed on [`BackendErrorKind`];
//! message text is only ever logged.

use stowage_core::{BackendError, BackendErrorKind, DatastoreError};

/// Normalize the outcome of a backend call.
///
/// `None` means the call succeeded.
pub fn normalize(error: Option<BackendError>) -> Result<(), DatastoreError> {
    match error {
        None => Ok(()),
        Some(e) => Err(normalize_error(e)),
    }
}

/// Map one backend error into the taxonomy.
pub fn normalize_error(error: BackendError) -> DatastoreError {
    match error.kind {
        BackendErrorKind::KeyNotFound | BackendErrorKind::NotStored => DatastoreError::NotFound,
        BackendErrorKind::KeyExists => DatastoreError::KeyExists,
        BackendErrorKind::ValueTooLarge => DatastoreError::OversizedBody,
        BackendErrorKind::InvalidArguments => DatastoreError::InvalidBody,
        BackendErrorKind::Timeout
        | BackendErrorKind::Unavailable
        | BackendErrorKind::Other(_) => {
            tracing::warn!(kind = %error.kind, message = %error.message, "unmapped cache backend error");
            DatastoreError::Backend {
                kind: error.kind,
                message: error.message,
            }
        }
    }
}
