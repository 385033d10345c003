use sealdex_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("domain name is reserved: {0}")]
    ReservedDomain(String),

    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    #[error("secure index needs at least one sketch")]
    NoSketches,

    #[error("document of {0} bytes exceeds the padding table")]
    DocumentTooLarge(u64),

    #[error("existing domain {domain} must be merged first")]
    MergeRequired { domain: String, docs: Vec<String> },

    #[error("no session state installed")]
    NoState,

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("keyring transport failed: {0}")]
    KeyringTransport(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
