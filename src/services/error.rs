use crate::crypto::HashError;

/// Failures of the credential, session and password reset operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email is already registered")]
    EmailInUse,

    /// Unknown email and wrong password are reported identically
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("another session was active; all sessions have been signed out")]
    SessionConflict,

    #[error("authentication required")]
    Unauthenticated,

    #[error("reset token is invalid or expired")]
    InvalidResetToken,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    PasswordHash(#[from] HashError),
}

impl AuthError {
    /// Map a UNIQUE violation on `users.email` to `EmailInUse`
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        let unique = err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        if unique {
            AuthError::EmailInUse
        } else {
            AuthError::Database(err)
        }
    }
}
