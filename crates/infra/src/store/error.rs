use thiserror::Error;

/// Document store failure.
///
/// These are infrastructure errors. Business rejections never come from the
/// store; they come back from the transaction's work closure unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// Every attempt lost the optimistic concurrency race.
    #[error("transaction gave up after {attempts} conflicting attempt(s)")]
    Contention { attempts: u32 },

    #[error("transaction deadline expired before commit")]
    Timeout,

    #[error("transaction cancelled before commit")]
    Cancelled,

    /// The work closure touched a key outside the declared key set.
    #[error("key {0} was not declared for this transaction")]
    UndeclaredKey(String),

    #[error("document {key} failed to decode: {reason}")]
    Decode { key: String, reason: String },

    #[error("failed to encode document: {0}")]
    Encode(String),
}

impl StoreError {
    pub fn decode(key: impl ToString, reason: impl ToString) -> Self {
        Self::Decode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
