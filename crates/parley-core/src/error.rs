use thiserror::Error;

/// Failures of a coordinator or file-share operation.
///
/// The `Display` text of every variant except `Database` and `Internal` is
/// safe to send to a client verbatim; see [`CoreError::client_message`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Expired(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("database error: {0}")]
    Database(#[from] parley_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub const GENERIC_ERROR_MESSAGE: &str = "Internal server error";

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Backend failures carry detail for the log only.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }

    pub fn client_message(&self) -> String {
        if self.is_backend() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<crate::auth::AuthError> for CoreError {
    fn from(err: crate::auth::AuthError) -> Self {
        match err {
            crate::auth::AuthError::Internal(detail) => Self::Internal(detail),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_detail_is_hidden_from_clients() {
        let err = CoreError::Database(parley_db::DbError::NotFound);
        assert_eq!(err.client_message(), GENERIC_ERROR_MESSAGE);
        let err = CoreError::Internal("pool timed out".into());
        assert_eq!(err.client_message(), GENERIC_ERROR_MESSAGE);

        let err = CoreError::Conflict("Username already taken in this room".into());
        assert_eq!(err.client_message(), "Username already taken in this room");
    }
}
