use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("envelope has no recipients")]
    NoRecipients,

    #[error("no envelope entry for recipient: {0}")]
    UnknownRecipient(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("envelope authentication failed: {0}")]
    Authentication(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
