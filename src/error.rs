//! Error taxonomy for the pipeline. Every variant is fatal to the
//! current invocation and propagated to the invoking runtime unmodified;
//! resilience comes from the runtime re-driving the whole invocation,
//! which overwrites the same shard path.

use thiserror::Error;

/// A persisted record that cannot be decoded back into an emit record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The record line is not the expected JSON structure or is missing
    /// required fields.
    #[error("malformed shard record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field flagged as base64 does not decode.
    #[error("field `{field}` is flagged base64 but does not decode: {source}")]
    InvalidBase64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    /// A field flagged as text holds bytes that are not valid UTF-8.
    #[error("field `{0}` is flagged as text but holds non-UTF-8 bytes")]
    NotText(&'static str),
}

#[derive(Debug, Error)]
pub enum Error {
    /// Object store read or write failure, including object-not-found.
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// A persisted shard record failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The invocation event or job context is malformed.
    #[error("invalid invocation input: {0}")]
    Schema(String),

    /// Decoded shard records disagree on the partition key.
    #[error("shard records disagree on partition key (expected {expected:?}, found {found:?})")]
    KeyMismatch { expected: String, found: String },

    /// A reducer was handed shards containing no records at all.
    #[error("no records found across {0} shard(s)")]
    EmptyPartition(usize),

    /// The user map or reduce callback failed.
    #[error("user function error: {0}")]
    UserFunction(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
