use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum DirectoryError {
    #[error("User not found")]
    NotFound,

    /// A create collided with an existing email. Surfaced distinctly so
    /// flows can report `email-already-in-use` instead of a generic
    /// storage failure.
    #[error("Email already in use")]
    DuplicateEmail,

    /// A credential id collided with an already-registered authenticator.
    #[error("Credential already registered")]
    DuplicateCredential,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        DirectoryError::InvalidData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = DirectoryError::from(json_error);
        match err {
            DirectoryError::InvalidData(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected InvalidData variant"),
        }
    }
}
