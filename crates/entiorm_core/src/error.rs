//! Error types for EntiORM core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the entity state machine and the query function layer.
///
/// Every variant is raised synchronously at the call site and is never
/// retried by this crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The caller supplied an unknown name, wrote a read-only field, or
    /// supplied a value violating the field's type or nullability.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the offending argument.
        message: String,
    },

    /// The operation is not valid in the current state, e.g. a required
    /// field resolved to null or the entity is not attached to a repository.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the state problem.
        message: String,
    },

    /// Programming error: unknown query function, or a backend missing an
    /// operator another backend provides.
    #[error("logic error: {message}")]
    Logic {
        /// Description of the logic error.
        message: String,
    },

    /// Snapshot encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] entiorm_codec::CodecError),
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a logic error.
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::InvalidArgument`].
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns true for [`CoreError::InvalidState`].
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns true for [`CoreError::Logic`].
    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entiorm_codec::CodecError;

    #[test]
    fn messages() {
        let err = CoreError::invalid_argument("Property 'id' is read-only.");
        assert_eq!(
            err.to_string(),
            "invalid argument: Property 'id' is read-only."
        );
        assert!(err.is_invalid_argument());
        assert!(!err.is_logic());
    }

    #[test]
    fn codec_errors_convert() {
        let err: CoreError = CodecError::FloatForbidden.into();
        assert!(matches!(err, CoreError::Codec(CodecError::FloatForbidden)));
    }
}
