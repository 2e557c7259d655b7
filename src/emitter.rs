//! Record accumulation and shard persistence.
//!
//! An [`Emitter`] lives for exactly one invocation. User callbacks call
//! [`Emitter::emit`] any number of times (pure buffering, no I/O), and
//! the invocation driver calls [`Emitter::flush`] exactly once at the
//! end, writing the whole buffer as a single shard object. The shard
//! path is a deterministic function of the job identity and the task,
//! so a redelivered invocation overwrites its own shard instead of
//! duplicating records.

use bytes::Bytes;
use tracing::debug;

use crate::codec::{self, EmitRecord};
use crate::error::{Error, Result};
use crate::ihash;
use crate::store::ObjectStore;

/// Which pipeline stage an emitter writes for. Part of the shard path,
/// so mapper-produced and reducer-produced objects never collide.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Stage {
    Mapper,
    Reducer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Mapper => "mapper",
            Stage::Reducer => "reducer",
        }
    }
}

/// Buffers records emitted during one invocation and persists them in a
/// single flush.
pub struct Emitter {
    bucket: String,
    prefix: String,
    job_id: String,
    stage: Stage,
    task: String,
    records: Vec<EmitRecord>,
}

impl Emitter {
    /// `task` is the invocation identity: the input object key for a
    /// mapper, the partition key for a reducer. Two concurrent
    /// invocations of the same job and stage always have distinct tasks,
    /// which is what keeps their shard paths from colliding.
    pub fn new(bucket: &str, prefix: &str, job_id: &str, stage: Stage, task: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            job_id: job_id.to_string(),
            stage,
            task: task.to_string(),
            records: Vec::new(),
        }
    }

    /// Append one key-value pair to the buffer. Each side is checked for
    /// UTF-8 validity and escaped as base64 when it is not text. Never
    /// performs I/O.
    pub fn emit(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.records.push(EmitRecord::new(key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The object key this emitter's records will be flushed to.
    pub fn shard_key(&self) -> String {
        format!(
            "{}/{}/{}/{}-{:08x}",
            self.prefix,
            self.job_id,
            self.stage.as_str(),
            slug(&self.task),
            ihash(self.task.as_bytes())
        )
    }

    /// Encode the buffered records and write them as one shard object.
    ///
    /// Consumes the emitter; one flush per invocation is the contract.
    /// An empty buffer still writes an (empty) shard, preserving the
    /// 1:1 invocation-to-object mapping downstream discovery relies on.
    pub async fn flush(self, store: &dyn ObjectStore) -> Result<String> {
        let key = self.shard_key();
        let body = codec::encode_shard(&self.records)?;
        debug!(
            shard = %key,
            records = self.records.len(),
            "flushing emit buffer"
        );
        store
            .put_object(&self.bucket, &key, body)
            .await
            .map_err(Error::Storage)?;
        Ok(key)
    }
}

/// Flattens a task identity into object-key-safe characters. The ihash
/// suffix on the shard name disambiguates tasks whose slugs collide.
fn slug(task: &str) -> String {
    task.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
