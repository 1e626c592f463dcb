//! Error types for tutord

use thiserror::Error;

/// Error raised by delivery collaborators (inbox, email)
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Delivery error: {0}")]
    DeliveryError(String),
}

impl TutorError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::DeliveryError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(TutorError::store("locked").to_string(), "Store error: locked");
        assert_eq!(
            TutorError::delivery("inbox unavailable").to_string(),
            "Delivery error: inbox unavailable"
        );
    }
}
