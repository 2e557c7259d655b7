//! Support library for CFMR, a MapReduce framework built on cloud
//! functions. Each mapper or reducer runs as one stateless function
//! invocation; the only thing invocations share is an S3-compatible
//! object store, accessed write-once-per-path.
//!
//! The library covers the shuffle-and-emission pipeline: encoding
//! emitted key-value pairs, persisting them as partitioned shard
//! objects, and reassembling a partition's records inside a reducer.
//! Scheduling, partition routing and the hosting function runtime are
//! the caller's concern.

use std::hash::Hasher;

use bytes::Bytes;

pub mod codec;
pub mod emitter;
pub mod error;
pub mod event;
pub mod mapper;
pub mod reducer;
pub mod store;
pub mod workload;

pub use codec::EmitRecord;
pub use emitter::{Emitter, Stage};
pub use error::{CodecError, Error};
pub use event::{JobContext, MapperEvent, MapperOutput, ReducerEvent, ReducerOutput};
pub use reducer::FetchOptions;
pub use store::{Client, ClientConfig, ObjectStore};

/////////////////////////////////////////////////////////////////////////////
// User callback contracts
/////////////////////////////////////////////////////////////////////////////

/// A map function takes the input object's key and raw bytes, emits
/// intermediate key-value pairs through the [`Emitter`], and returns a
/// result value that is passed back to the invoking runtime verbatim.
pub type MapperFn = fn(key: &str, data: Bytes, em: &mut Emitter) -> anyhow::Result<serde_json::Value>;

/// A reduce function takes the partition key, every value emitted for it
/// across all fetched shards, and an [`Emitter`] for the next stage.
///
/// Shard fetch completion order is not deterministic across runs, so the
/// values must be treated as an unordered multiset, not a sequence.
pub type ReducerFn =
    fn(key: Bytes, values: Vec<Bytes>, em: &mut Emitter) -> anyhow::Result<serde_json::Value>;

/// Hashes a task identity. Used as the collision-breaking suffix of a
/// shard object name.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    let value = hasher.finish() & 0x7fffffff;
    u32::try_from(value).expect("Failed to compute ihash of value")
}
