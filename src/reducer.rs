//! Reducer invocation driver.
//!
//! A reducer is handed every shard object belonging to one partition.
//! Shard fetches are independent, so they are fanned out concurrently
//! under a semaphore and joined before decoding; one failed fetch aborts
//! the rest and fails the invocation with no partial reduce.

use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info_span, Instrument};

use crate::codec::{self, EmitRecord};
use crate::emitter::{Emitter, Stage};
use crate::error::{Error, Result};
use crate::event::{JobContext, ReducerEvent, ReducerOutput};
use crate::store::ObjectStore;
use crate::ReducerFn;

/// Fan-in tuning for the shard fetch step.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Maximum shard fetches in flight at once.
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

/// Drive one reducer invocation: fetch all shards for the partition,
/// decode and regroup their records, run the user reduce function, flush
/// its emissions, and wrap the user result.
///
/// All decoded records must carry the same key; the upstream partitioner
/// is supposed to guarantee that, and it is verified here rather than
/// trusted.
pub async fn handle(
    store: Arc<dyn ObjectStore>,
    event: ReducerEvent,
    ctx: &JobContext,
    reducer_fn: ReducerFn,
    fetch: FetchOptions,
) -> Result<ReducerOutput> {
    let span = info_span!("reducer", job_id = %ctx.job_id, partition = %event.key, shards = event.value.len());
    async {
        let bodies = fetch_shards(
            Arc::clone(&store),
            &ctx.output_bucket,
            &event.value,
            fetch.concurrency,
        )
        .await?;

        let mut records: Vec<EmitRecord> = Vec::new();
        for body in &bodies {
            records.extend(codec::decode_shard(body)?);
        }
        debug!(records = records.len(), "decoded partition records");

        if records.is_empty() {
            return Err(Error::EmptyPartition(event.value.len()));
        }

        let key = records[0].key.clone();
        for record in &records[1..] {
            if record.key != key {
                return Err(Error::KeyMismatch {
                    expected: String::from_utf8_lossy(&key).into_owned(),
                    found: String::from_utf8_lossy(&record.key).into_owned(),
                });
            }
        }
        let values: Vec<Bytes> = records.into_iter().map(|r| r.value).collect();

        let mut em = Emitter::new(
            &ctx.output_bucket,
            &ctx.output_prefix,
            &ctx.job_id,
            Stage::Reducer,
            &event.key,
        );

        let reducer_result = reducer_fn(key, values, &mut em).map_err(Error::UserFunction)?;
        debug!(emitted = em.len(), "reduce function returned");

        em.flush(store.as_ref()).await?;

        Ok(ReducerOutput { reducer_result })
    }
    .instrument(span)
    .await
}

/// Fetch every shard body with bounded parallelism, failing fast: the
/// first error aborts all in-flight fetches. Completion order is
/// whatever the store returns first, which is why downstream treats the
/// values as an unordered multiset.
async fn fetch_shards(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    keys: &[String],
    concurrency: usize,
) -> Result<Vec<Bytes>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for key in keys {
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);
        let bucket = bucket.to_string();
        let key = key.clone();
        set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Storage(anyhow!(e)))?;
            store
                .get_object(&bucket, &key)
                .await
                .map_err(|e| Error::Storage(e.context(format!("fetching shard {key}"))))
        });
    }

    let mut bodies = Vec::with_capacity(keys.len());
    while let Some(joined) = set.join_next().await {
        let fetched = joined
            .unwrap_or_else(|e| Err(Error::Storage(anyhow!("shard fetch task failed: {e}"))));
        match fetched {
            Ok(body) => bodies.push(body),
            Err(e) => {
                set.abort_all();
                return Err(e);
            }
        }
    }
    Ok(bodies)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::{json, Value};

    use super::*;
    use crate::store::memory::MemoryStore;

    fn ctx() -> JobContext {
        JobContext {
            output_bucket: "out".to_string(),
            output_prefix: "jobs".to_string(),
            job_id: "job-1".to_string(),
            input_bucket: None,
        }
    }

    /// Writes one mapper shard holding the given pairs and returns its key.
    async fn seed_shard(store: &MemoryStore, task: &str, pairs: &[(Bytes, Bytes)]) -> String {
        let mut em = Emitter::new("out", "jobs", "job-1", Stage::Mapper, task);
        for (k, v) in pairs {
            em.emit(k.clone(), v.clone());
        }
        em.flush(store).await.unwrap()
    }

    fn summarize(key: Bytes, values: Vec<Bytes>, em: &mut Emitter) -> anyhow::Result<Value> {
        let mut decoded: Vec<String> = values
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect();
        decoded.sort();
        em.emit(key.clone(), format!("{}", decoded.len()));
        Ok(json!({
            "key": String::from_utf8_lossy(&key).into_owned(),
            "values": decoded,
        }))
    }

    #[tokio::test]
    async fn regroups_values_across_shards() {
        let store = Arc::new(MemoryStore::new());
        let one = Bytes::from("1");
        let w = Bytes::from("w");
        let s0 = seed_shard(&store, "m0", &[(w.clone(), one.clone())]).await;
        let s1 = seed_shard(&store, "m1", &[(w.clone(), one.clone())]).await;

        let out = handle(
            store.clone(),
            ReducerEvent {
                key: "p0".to_string(),
                value: vec![s0, s1],
            },
            &ctx(),
            summarize,
            FetchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(out.reducer_result, json!({"key": "w", "values": ["1", "1"]}));

        // the reducer's own emission was flushed under the reducer stage
        let shard_key = Emitter::new("out", "jobs", "job-1", Stage::Reducer, "p0").shard_key();
        let records = codec::decode_shard(&store.get("out", &shard_key).unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, Bytes::from("2"));
    }

    #[tokio::test]
    async fn shard_arrival_order_does_not_change_the_multiset() {
        let store = Arc::new(MemoryStore::new());
        let w = Bytes::from("w");
        let s0 = seed_shard(&store, "m0", &[(w.clone(), Bytes::from("a"))]).await;
        let s1 = seed_shard(&store, "m1", &[(w.clone(), Bytes::from("b"))]).await;

        for shards in [vec![s0.clone(), s1.clone()], vec![s1, s0]] {
            let out = handle(
                store.clone(),
                ReducerEvent {
                    key: "p0".to_string(),
                    value: shards,
                },
                &ctx(),
                summarize,
                FetchOptions { concurrency: 1 },
            )
            .await
            .unwrap();
            assert_eq!(out.reducer_result["values"], json!(["a", "b"]));
        }
    }

    #[tokio::test]
    async fn binary_values_survive_the_round_trip() {
        fn first_value(_: Bytes, values: Vec<Bytes>, _: &mut Emitter) -> anyhow::Result<Value> {
            Ok(json!(values[0].to_vec()))
        }

        let store = Arc::new(MemoryStore::new());
        let raw = Bytes::from_static(&[0xde, 0xad, 0x00]);
        let shard = seed_shard(&store, "m0", &[(Bytes::from("k"), raw.clone())]).await;

        let out = handle(
            store.clone(),
            ReducerEvent {
                key: "p0".to_string(),
                value: vec![shard],
            },
            &ctx(),
            first_value,
            FetchOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.reducer_result, json!([0xde, 0xad, 0x00]));
    }

    static REDUCE_CALLED: AtomicBool = AtomicBool::new(false);

    #[tokio::test]
    async fn one_failed_fetch_fails_the_invocation_before_reducing() {
        fn observed(_: Bytes, _: Vec<Bytes>, _: &mut Emitter) -> anyhow::Result<Value> {
            REDUCE_CALLED.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        }

        let store = Arc::new(MemoryStore::new());
        let w = Bytes::from("w");
        let one = Bytes::from("1");
        let s0 = seed_shard(&store, "m0", &[(w.clone(), one.clone())]).await;
        let s1 = seed_shard(&store, "m1", &[(w.clone(), one.clone())]).await;
        store.fail_gets_for(&s1);

        let err = handle(
            store.clone(),
            ReducerEvent {
                key: "p0".to_string(),
                value: vec![s0, s1],
            },
            &ctx(),
            observed,
            FetchOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert!(!REDUCE_CALLED.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn mismatched_keys_across_shards_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let s0 = seed_shard(&store, "m0", &[(Bytes::from("w"), Bytes::from("1"))]).await;
        let s1 = seed_shard(&store, "m1", &[(Bytes::from("x"), Bytes::from("1"))]).await;

        let err = handle(
            store.clone(),
            ReducerEvent {
                key: "p0".to_string(),
                value: vec![s0, s1],
            },
            &ctx(),
            summarize,
            FetchOptions { concurrency: 1 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::KeyMismatch { .. }));
    }

    #[tokio::test]
    async fn all_empty_shards_is_an_empty_partition() {
        let store = Arc::new(MemoryStore::new());
        let s0 = seed_shard(&store, "m0", &[]).await;
        let s1 = seed_shard(&store, "m1", &[]).await;

        let err = handle(
            store.clone(),
            ReducerEvent {
                key: "p0".to_string(),
                value: vec![s0, s1],
            },
            &ctx(),
            summarize,
            FetchOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::EmptyPartition(2)));
    }

    #[tokio::test]
    async fn corrupt_shard_is_a_codec_error() {
        let store = Arc::new(MemoryStore::new());
        store.insert("out", "jobs/job-1/mapper/bad", Bytes::from("not json\n"));

        let err = handle(
            store.clone(),
            ReducerEvent {
                key: "p0".to_string(),
                value: vec!["jobs/job-1/mapper/bad".to_string()],
            },
            &ctx(),
            summarize,
            FetchOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
