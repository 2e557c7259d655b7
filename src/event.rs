//! Invocation input and output schemas.
//!
//! The hosting runtime delivers events and job metadata as loose JSON.
//! Everything is validated into typed structs at this boundary so a
//! malformed invocation fails with [`Error::Schema`] up front instead of
//! a lookup fault deep in the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Identity of one job run, supplied by the invoking runtime with each
/// invocation and discarded when the invocation returns.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    /// Bucket that intermediate and final shard objects are written to.
    pub output_bucket: String,

    /// Path namespace inside `output_bucket` for this deployment.
    pub output_prefix: String,

    /// Unique identifier of this job run.
    pub job_id: String,

    /// Bucket holding the job's input objects. Only the mapper path
    /// needs it, so the runtime may omit it for reducers.
    #[serde(default)]
    pub input_bucket: Option<String>,
}

impl JobContext {
    pub fn parse(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| Error::Schema(format!("job context: {e}")))
    }

    /// The input bucket, which a mapper invocation cannot run without.
    pub fn require_input_bucket(&self) -> Result<&str> {
        self.input_bucket
            .as_deref()
            .ok_or_else(|| Error::Schema("job context is missing inputBucket".to_string()))
    }
}

/// Event for one mapper invocation: the input object to map over.
#[derive(Debug, Clone, Deserialize)]
pub struct MapperEvent {
    /// Key of the input object within the job's input bucket.
    pub key: String,
}

impl MapperEvent {
    pub fn parse(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| Error::Schema(format!("mapper event: {e}")))
    }
}

/// Event for one reducer invocation: the partition key and every shard
/// object belonging to that partition.
#[derive(Debug, Clone, Deserialize)]
pub struct ReducerEvent {
    /// Opaque partition identity, used for shard naming only; the key
    /// handed to the reduce callback comes from the decoded records.
    pub key: String,

    /// Shard object keys within the job's output bucket.
    pub value: Vec<String>,
}

impl ReducerEvent {
    pub fn parse(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| Error::Schema(format!("reducer event: {e}")))
    }
}

/// What a mapper invocation returns to the runtime.
#[derive(Debug, Serialize)]
pub struct MapperOutput {
    #[serde(rename = "mapperResult")]
    pub mapper_result: Value,
}

/// What a reducer invocation returns to the runtime.
#[derive(Debug, Serialize)]
pub struct ReducerOutput {
    #[serde(rename = "reducerResult")]
    pub reducer_result: Value,
}
